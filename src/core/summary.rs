use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::Float;

/// How many times each kind of derivative was requested during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluations {
    /// Objective values.
    pub cost: usize,
    /// Gradients.
    pub gradient: usize,
    /// Hessian-vector products.
    pub hvp: usize,
}

/// A struct that holds the results of a minimization run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MinimizationSummary {
    /// The names of the parameters. This is `None` if no names were set.
    pub parameter_names: Option<Vec<String>>,
    /// A message that can be set by minimization algorithms.
    pub message: String,
    /// The initial parameters of the minimization.
    pub x0: Vec<Float>,
    /// The final parameters of the minimization.
    pub x: Vec<Float>,
    /// The value of the objective at [`MinimizationSummary::x`].
    pub fx: Float,
    /// Evaluation counts for the whole run.
    pub evaluations: Evaluations,
    /// The number of steps taken.
    pub steps: usize,
    /// Flag that says whether or not the fit is in a converged state.
    pub converged: bool,
}

impl MinimizationSummary {
    /// Set the names associated with each parameter.
    pub fn with_parameter_names<I: IntoIterator<Item = S>, S: AsRef<str>>(
        mut self,
        parameter_names: I,
    ) -> Self {
        self.parameter_names = Some(
            parameter_names
                .into_iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
        );
        self
    }
}

impl Display for MinimizationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "FIT RESULTS: {}",
            if self.converged {
                "Converged"
            } else {
                "Not converged"
            }
        )?;
        writeln!(f, "Message:   {}", self.message)?;
        writeln!(f, "f(x):      {:.5}", self.fx)?;
        writeln!(
            f,
            "#steps:    {}  #f(x): {}  #∇f(x): {}  #Hv: {}",
            self.steps, self.evaluations.cost, self.evaluations.gradient, self.evaluations.hvp
        )?;
        let names = self.parameter_names.clone().unwrap_or_else(|| {
            (0..self.x.len()).map(|i| format!("x_{i}")).collect()
        });
        let width = names.iter().map(String::len).max().unwrap_or(0);
        for ((name, v), v0) in names.iter().zip(&self.x).zip(&self.x0) {
            writeln!(f, "  {name:<width$}  {v:+.5}  (from {v0:+.5})")?;
        }
        Ok(())
    }
}
