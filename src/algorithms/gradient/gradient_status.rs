use crate::{core::Evaluations, traits::Status, DVector, Float};
use serde::{Deserialize, Serialize};

/// The running state shared by every gradient-based optimizer: the current iterate, its
/// objective value, evaluation counts, and whether a convergence criterion has fired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradientStatus {
    /// The last message set by the optimizer or one of its callbacks.
    pub message: String,
    /// The current iterate.
    pub x: DVector<Float>,
    /// The objective at [`GradientStatus::x`].
    pub fx: Float,
    /// Evaluation counts so far.
    pub evals: Evaluations,
    /// Set once a convergence criterion is met.
    pub converged: bool,
}

impl Status for GradientStatus {
    fn reset(&mut self) {
        *self = Self {
            x: DVector::zeros(self.x.len()),
            ..Self::default()
        };
    }
    fn converged(&self) -> bool {
        self.converged
    }
    fn message(&self) -> &str {
        &self.message
    }
    fn update_message(&mut self, message: &str) {
        self.with_message(message);
    }
}

impl GradientStatus {
    /// Replace the message.
    pub fn with_message(&mut self, message: &str) {
        message.clone_into(&mut self.message);
    }
    /// Record a new iterate and its objective value.
    pub fn move_to(&mut self, x: DVector<Float>, fx: Float) {
        self.x = x;
        self.fx = fx;
    }
    /// Mark the run as converged.
    pub fn set_converged(&mut self) {
        self.converged = true;
    }
    /// Count one objective evaluation.
    pub fn count_cost(&mut self) {
        self.evals.cost += 1;
    }
    /// Count one gradient evaluation.
    pub fn count_gradient(&mut self) {
        self.evals.gradient += 1;
    }
    /// Count one Hessian-vector product.
    pub fn count_hvp(&mut self) {
        self.evals.hvp += 1;
    }
}
