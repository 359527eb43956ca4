use crate::{core::MinimizationSummary, DVector, Float};

/// Implementation of the Adam algorithm.
pub mod adam;
pub use adam::{Adam, AdamConfig};

/// An exponential-moving-average plateau [`Terminator`](crate::traits::Terminator).
pub mod ema_loss;
pub use ema_loss::EmaLossTerminator;

/// Implementation of gradient descent with momentum.
pub mod gradient_descent;
pub use gradient_descent::{GradientDescent, GradientDescentConfig};

/// [`GradientStatus`] type for gradient-based minimizers.
pub mod gradient_status;
pub use gradient_status::GradientStatus;

/// Implementation of the truncated Newton (Newton-CG) algorithm.
pub mod newton_cg;
pub use newton_cg::{NewtonCG, NewtonCGConfig, NewtonCGGTerminator};

/// Implementation of the RMSProp algorithm.
pub mod rms_prop;
pub use rms_prop::{RMSProp, RMSPropConfig};

fn summarize_status(
    x0: &DVector<Float>,
    current_step: usize,
    status: &GradientStatus,
) -> MinimizationSummary {
    MinimizationSummary {
        parameter_names: None,
        message: status.message.clone(),
        x0: x0.iter().copied().collect(),
        x: status.x.iter().copied().collect(),
        fx: status.fx,
        evaluations: status.evals,
        steps: current_step + 1,
        converged: status.converged,
    }
}
