use crate::{
    core::Callbacks,
    traits::{Status, Terminator},
};
use std::convert::Infallible;

/// A trait representing a minimization algorithm.
///
/// This trait is implemented for the algorithms found in the [`algorithms`](crate::algorithms)
/// module. [`Algorithm::process`] drives the main loop: one [`Algorithm::step`] followed by the
/// [`Callbacks`], until one of the [`Terminator`]s breaks.
pub trait Algorithm<P, S: Status, U = (), E = Infallible> {
    /// A type which holds a summary of the algorithm's ending state.
    type Summary;
    /// The configuration struct for the algorithm.
    type Config;

    /// Any setup work done before the main steps of the algorithm should be done here.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. See
    /// [`CostFunction::evaluate`](crate::traits::CostFunction::evaluate) for more information.
    fn initialize(
        &mut self,
        config: Self::Config,
        problem: &P,
        status: &mut S,
        args: &U,
    ) -> Result<(), E>;

    /// The main "step" of an algorithm, which is repeated until termination conditions are met or
    /// the max number of steps have been taken.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. See
    /// [`CostFunction::evaluate`](crate::traits::CostFunction::evaluate) for more information.
    fn step(
        &mut self,
        current_step: usize,
        problem: &P,
        status: &mut S,
        args: &U,
    ) -> Result<(), E>;

    /// Generates a new [`Algorithm::Summary`] from the current state of the [`Algorithm`], which
    /// can be displayed or used elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if any internal evaluation fails while creating the
    /// [`Algorithm::Summary`].
    fn summarize(
        &self,
        current_step: usize,
        problem: &P,
        status: &S,
        args: &U,
    ) -> Result<Self::Summary, E>;

    /// Reset the algorithm to its initial state.
    fn reset(&mut self) {}

    /// The [`Callbacks`] an algorithm needs to terminate on its own (convergence checks).
    fn default_callbacks() -> Callbacks<Self, P, S, U, E>
    where
        Self: Sized,
    {
        Callbacks::empty()
    }

    /// Run the algorithm from `config` until a callback terminates it.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if any evaluation fails. See
    /// [`CostFunction::evaluate`](crate::traits::CostFunction::evaluate) for more information.
    fn process(
        &mut self,
        problem: &P,
        args: &U,
        config: Self::Config,
        mut callbacks: Callbacks<Self, P, S, U, E>,
    ) -> Result<Self::Summary, E>
    where
        Self: Sized,
    {
        self.reset();
        let mut status = S::default();
        self.initialize(config, problem, &mut status, args)?;
        let mut current_step = 0;
        loop {
            self.step(current_step, problem, &mut status, args)?;
            if callbacks
                .check_for_termination(current_step, self, problem, &mut status, args)
                .is_break()
            {
                break;
            }
            current_step += 1;
        }
        self.summarize(current_step, problem, &status, args)
    }
}
