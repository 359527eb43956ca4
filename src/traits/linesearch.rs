use crate::{
    traits::{Gradient, Status},
    DVector, Float,
};
use dyn_clone::DynClone;

/// A struct containing the output of a line search in the direction $`\vec{p}`$.
#[derive(Debug, Clone)]
pub struct LineSearchOutput {
    /// The step size $`\alpha`$ obtained from the line search
    pub alpha: Float,
    /// The value of the objective function at $`\vec{x} + \alpha \vec{p}`$
    pub fx: Float,
    /// The value of the gradient at $`\vec{x} + \alpha \vec{p}`$
    pub g: DVector<Float>,
}

/// A trait which defines the methods for a line search algorithm.
///
/// Line searches are one-dimensional minimizers typically used to determine step sizes for
/// [`Algorithm`](`crate::traits::Algorithm`)s which only provide a direction for the next step.
pub trait LineSearch<S: Status, U, E>: DynClone {
    /// Search along `p` from `x`, where the objective is already known to be `fx` with gradient
    /// `g`.
    ///
    /// The outer [`Result`] tells the caller if the line search encountered any errors in
    /// evaluating cost functions or gradients, while the inner [`Result`] indicates if the line
    /// search found an acceptable step. Even if it did not, the best [`LineSearchOutput`] found is
    /// returned, and individual algorithms decide how to handle that case.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. See
    /// [`CostFunction::evaluate`](`crate::traits::CostFunction::evaluate`) for more
    /// information.
    #[allow(clippy::too_many_arguments)]
    fn search(
        &mut self,
        x: &DVector<Float>,
        fx: Float,
        g: &DVector<Float>,
        p: &DVector<Float>,
        problem: &dyn Gradient<U, E>,
        args: &U,
        status: &mut S,
    ) -> Result<Result<LineSearchOutput, LineSearchOutput>, E>;
}
dyn_clone::clone_trait_object!(<S: Status, U, E> LineSearch<S, U, E>);
