use crate::traits::{Algorithm, Observer, Status, Terminator};
use std::{fmt::Debug, ops::ControlFlow};

enum CallbackLike<A, P, S, U, E> {
    Terminator(Box<dyn Terminator<A, P, S, U, E>>),
    Observer(Box<dyn Observer<A, P, S, U, E>>),
}
impl<A, P, S, U, E> CallbackLike<A, P, S, U, E>
where
    A: Algorithm<P, S, U, E>,
    S: Status,
{
    fn callback(
        &mut self,
        current_step: usize,
        algorithm: &mut A,
        problem: &P,
        status: &mut S,
        args: &U,
    ) -> ControlFlow<()> {
        match self {
            Self::Terminator(terminator) => {
                terminator.check_for_termination(current_step, algorithm, problem, status, args)
            }
            Self::Observer(observer) => {
                observer.observe(current_step, algorithm, problem, status, args);
                ControlFlow::Continue(())
            }
        }
    }
}

/// A set of [`Terminator`]s and/or [`Observer`]s which can be used as an input to
/// [`Algorithm::process`].
///
/// Callbacks run in insertion order and stop at the first [`Terminator`] that breaks, so
/// anything which must see every step belongs at the front.
pub struct Callbacks<A, P, S, U, E>(Vec<CallbackLike<A, P, S, U, E>>);
impl<A, P, S, U, E> Callbacks<A, P, S, U, E> {
    /// Create an empty set of callbacks.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Return the set of [`Callbacks`] with an additional [`Terminator`] added.
    pub fn with_terminator<T>(mut self, terminator: T) -> Self
    where
        T: Terminator<A, P, S, U, E> + 'static,
        A: Algorithm<P, S, U, E>,
        S: Status,
    {
        self.0.push(CallbackLike::Terminator(Box::new(terminator)));
        self
    }

    /// Return the set of [`Callbacks`] with an additional [`Observer`] added.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: Observer<A, P, S, U, E> + 'static,
        A: Algorithm<P, S, U, E>,
        S: Status,
    {
        self.0.push(CallbackLike::Observer(Box::new(observer)));
        self
    }
}
impl<A, P, S, U, E> Terminator<A, P, S, U, E> for Callbacks<A, P, S, U, E>
where
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
        if self.0.iter_mut().any(|callback| {
            callback
                .callback(current_step, algorithm, problem, status, args)
                .is_break()
        }) {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// A [`Terminator`] which terminates the algorithm after a number of steps.
pub struct MaxSteps(pub usize);
impl Default for MaxSteps {
    fn default() -> Self {
        Self(4000)
    }
}
impl<A, P, S, U, E> Terminator<A, P, S, U, E> for MaxSteps
where
    A: Algorithm<P, S, U, E>,
    S: Status,
{
    fn check_for_termination(
        &mut self,
        current_step: usize,
        _algorithm: &mut A,
        _problem: &P,
        status: &mut S,
        _args: &U,
    ) -> ControlFlow<()> {
        if current_step >= self.0.saturating_sub(1) {
            status.update_message(&format!("Maximum number of steps reached ({})!", self.0));
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// An [`Observer`] which logs each step's message at the `debug` level and the whole status at
/// the `trace` level. Every mixture fit carries one.
///
/// # Usage:
///
/// ```rust
/// use mixgrad::traits::*;
/// use mixgrad::algorithms::gradient::{Adam, AdamConfig};
/// use mixgrad::test_functions::Rosenbrock;
/// use mixgrad::core::{DebugObserver, MaxSteps};
///
/// let problem = Rosenbrock { n: 2 };
/// let mut adam = Adam::default();
/// let result = adam
///     .process(
///         &problem,
///         &(),
///         AdamConfig::default().with_x0([2.3, 3.4]),
///         Adam::default_callbacks()
///             .with_observer(DebugObserver)
///             .with_terminator(MaxSteps(10)),
///     )
///     .unwrap();
/// assert_eq!(result.x.len(), 2);
/// ```
pub struct DebugObserver;
impl<A, P, S, U, E> Observer<A, P, S, U, E> for DebugObserver
where
    A: Algorithm<P, S, U, E>,
    S: Status + Debug,
{
    fn observe(
        &mut self,
        current_step: usize,
        _algorithm: &A,
        _problem: &P,
        status: &S,
        _args: &U,
    ) {
        log::debug!("step {current_step}: {}", status.message());
        log::trace!("{status:?}");
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::{
        algorithms::gradient::{GradientDescent, GradientDescentConfig, GradientStatus},
        test_functions::Sphere,
    };

    struct StopAt(usize);
    impl<A, P, U, E> Terminator<A, P, GradientStatus, U, E> for StopAt
    where
        A: Algorithm<P, GradientStatus, U, E>,
    {
        fn check_for_termination(
            &mut self,
            current_step: usize,
            _algorithm: &mut A,
            _problem: &P,
            status: &mut GradientStatus,
            _args: &U,
        ) -> ControlFlow<()> {
            if current_step + 1 == self.0 {
                status.with_message("STOPPED");
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn the_first_breaking_terminator_wins() -> Result<(), Infallible> {
        let run = |callbacks: Callbacks<GradientDescent, Sphere, GradientStatus, (), Infallible>| {
            GradientDescent::default().process(
                &Sphere { n: 2 },
                &(),
                GradientDescentConfig::default().with_x0([1.0, 1.0]),
                callbacks,
            )
        };
        let summary = run(Callbacks::empty()
            .with_terminator(StopAt(3))
            .with_terminator(MaxSteps(3)))?;
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.message, "STOPPED");
        let summary = run(Callbacks::empty()
            .with_observer(DebugObserver)
            .with_terminator(MaxSteps(3))
            .with_terminator(StopAt(3)))?;
        assert_eq!(summary.message, "Maximum number of steps reached (3)!");
        Ok(())
    }
}
