use crate::{
    algorithms::gradient::{summarize_status, EmaLossTerminator, GradientStatus},
    core::{Callbacks, MinimizationSummary},
    traits::{Algorithm, Gradient},
    DVector, Float,
};

/// The internal configuration struct for the [`GradientDescent`] algorithm.
#[derive(Clone)]
pub struct GradientDescentConfig {
    x0: DVector<Float>,
    learning_rate: Float,
    momentum: Float,
}
impl Default for GradientDescentConfig {
    fn default() -> Self {
        Self {
            x0: DVector::zeros(0),
            learning_rate: 1e-4,
            momentum: 0.9,
        }
    }
}
impl GradientDescentConfig {
    /// Set the starting position of the algorithm.
    pub fn with_x0<I: IntoIterator<Item = Float>>(mut self, x0: I) -> Self {
        self.x0 = DVector::from_vec(x0.into_iter().collect());
        self
    }
    /// Set the learning rate $`\eta`$ (default = `1e-4`).
    pub const fn with_learning_rate(mut self, value: Float) -> Self {
        self.learning_rate = value;
        self
    }
    /// Set the momentum $`\mu \in [0, 1)`$ (default = `0.9`). Zero gives plain gradient descent.
    pub const fn with_momentum(mut self, value: Float) -> Self {
        self.momentum = value;
        self
    }
}

/// Gradient descent with (heavy-ball) momentum:
///
/// ```math
/// \vec{v}_{t+1} = \mu\vec{v}_t - \eta\nabla f(\vec{x}_t), \qquad \vec{x}_{t+1} = \vec{x}_t + \vec{v}_{t+1}
/// ```
#[derive(Clone, Default)]
pub struct GradientDescent {
    config: GradientDescentConfig,
    x: DVector<Float>,
    velocity: DVector<Float>,
}

impl<P, U, E> Algorithm<P, GradientStatus, U, E> for GradientDescent
where
    P: Gradient<U, E>,
{
    type Summary = MinimizationSummary;
    type Config = GradientDescentConfig;

    fn initialize(
        &mut self,
        config: Self::Config,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        self.config = config;
        self.x = self.config.x0.clone();
        self.velocity = DVector::zeros(self.x.len());
        let f = problem.evaluate(&self.x, args)?;
        status.count_cost();
        status.move_to(self.x.clone(), f);
        Ok(())
    }

    fn step(
        &mut self,
        _current_step: usize,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        let g = problem.gradient(&self.x, args)?;
        status.count_gradient();
        self.velocity = self.velocity.scale(self.config.momentum) - g.scale(self.config.learning_rate);
        self.x += &self.velocity;
        let f = problem.evaluate(&self.x, args)?;
        status.count_cost();
        status.move_to(self.x.clone(), f);
        Ok(())
    }

    fn summarize(
        &self,
        current_step: usize,
        _problem: &P,
        status: &GradientStatus,
        _args: &U,
    ) -> Result<Self::Summary, E> {
        Ok(summarize_status(&self.config.x0, current_step, status))
    }

    fn default_callbacks() -> Callbacks<Self, P, GradientStatus, U, E>
    where
        Self: Sized,
    {
        Callbacks::empty().with_terminator(EmaLossTerminator::default())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use approx::assert_relative_eq;

    use super::*;
    use crate::{core::MaxSteps, test_functions::Sphere};

    #[test]
    fn test_gradient_descent() -> Result<(), Infallible> {
        let problem = Sphere { n: 3 };
        let result = GradientDescent::default().process(
            &problem,
            &(),
            GradientDescentConfig::default()
                .with_x0([1.0, -2.0, 0.5])
                .with_learning_rate(0.05),
            GradientDescent::default_callbacks().with_terminator(MaxSteps(10_000)),
        )?;
        assert!(result.converged, "{}", result.message);
        assert_relative_eq!(result.fx, 0.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_plain_descent_follows_the_gradient() -> Result<(), Infallible> {
        // one step of x - 0.25 * 2x halves every coordinate
        let problem = Sphere { n: 2 };
        let result = GradientDescent::default().process(
            &problem,
            &(),
            GradientDescentConfig::default()
                .with_x0([4.0, -2.0])
                .with_learning_rate(0.25)
                .with_momentum(0.0),
            GradientDescent::default_callbacks().with_terminator(MaxSteps(1)),
        )?;
        assert_eq!(result.x, vec![2.0, -1.0]);
        assert_eq!(result.steps, 1);
        Ok(())
    }
}
