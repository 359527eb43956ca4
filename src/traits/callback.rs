use parking_lot::RwLock;
use std::{ops::ControlFlow, sync::Arc};

use crate::traits::{Algorithm, Status};

/// A callback which may stop an [`Algorithm`] after any step.
///
/// Terminators see the [`Algorithm`] and its [`Status`] mutably, so they can also mark a run as
/// converged or rewrite its message before returning [`ControlFlow::Break`].
pub trait Terminator<A, P, S, U, E>
where
    A: Algorithm<P, S, U, E>,
    S: Status,
{
    /// Called once after every step.
    fn check_for_termination(
        &mut self,
        current_step: usize,
        algorithm: &mut A,
        problem: &P,
        status: &mut S,
        args: &U,
    ) -> ControlFlow<()>;
}

/// A shared terminator, for state the caller reads back once the run is over (the fit trace,
/// for instance).
impl<T, A, P, S, U, E> Terminator<A, P, S, U, E> for Arc<RwLock<T>>
where
    T: Terminator<A, P, S, U, E>,
    A: Algorithm<P, S, U, E>,
    S: Status,
{
    fn check_for_termination(
        &mut self,
        current_step: usize,
        algorithm: &mut A,
        problem: &P,
        status: &mut S,
        args: &U,
    ) -> ControlFlow<()> {
        self.write()
            .check_for_termination(current_step, algorithm, problem, status, args)
    }
}

/// A read-only callback which is called after every step of an [`Algorithm`].
pub trait Observer<A, P, S, U, E>
where
    A: Algorithm<P, S, U, E>,
    S: Status,
{
    /// Called once after every step.
    fn observe(&mut self, current_step: usize, algorithm: &A, problem: &P, status: &S, args: &U);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::gradient::{Adam, AdamConfig, GradientStatus},
        core::MaxSteps,
        test_functions::Sphere,
        Float,
    };

    #[derive(Default)]
    struct BestSoFar(Vec<Float>);
    impl<A, P, U, E> Terminator<A, P, GradientStatus, U, E> for BestSoFar
    where
        A: Algorithm<P, GradientStatus, U, E>,
    {
        fn check_for_termination(
            &mut self,
            _current_step: usize,
            _algorithm: &mut A,
            _problem: &P,
            status: &mut GradientStatus,
            _args: &U,
        ) -> ControlFlow<()> {
            let best = self.0.last().copied().unwrap_or(Float::INFINITY);
            self.0.push(best.min(status.fx));
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn shared_terminators_are_readable_after_the_run() {
        let record = Arc::new(RwLock::new(BestSoFar::default()));
        let result = Adam::default()
            .process(
                &Sphere { n: 3 },
                &(),
                AdamConfig::default().with_x0([1.0, -1.0, 0.5]),
                Adam::default_callbacks()
                    .with_terminator(record.clone())
                    .with_terminator(MaxSteps(7)),
            )
            .unwrap();
        let record = record.read();
        assert_eq!(record.0.len(), result.steps);
        assert!(record.0.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(result.message, "Maximum number of steps reached (7)!");
    }
}
