use crate::{
    algorithms::gradient::{summarize_status, EmaLossTerminator, GradientStatus},
    core::{Callbacks, MinimizationSummary},
    traits::{Algorithm, Gradient},
    DVector, Float,
};

/// The internal configuration struct for the [`Adam`] algorithm.
#[derive(Clone)]
pub struct AdamConfig {
    x0: DVector<Float>,
    alpha: Float,
    beta_1: Float,
    beta_2: Float,
    epsilon: Float,
}
impl AdamConfig {
    /// Set the starting position of the algorithm.
    pub fn with_x0<I: IntoIterator<Item = Float>>(mut self, x0: I) -> Self {
        self.x0 = DVector::from_vec(x0.into_iter().collect());
        self
    }
    /// Set the initial learning rate $`\alpha`$ (default = `0.001`).
    pub const fn with_alpha(mut self, value: Float) -> Self {
        self.alpha = value;
        self
    }
    /// Set the value for the hyperparameter $`\beta_1`$ (default = `0.9`).
    ///
    /// This represents the exponential decay rate of the first moment estimate, $`m`$.
    pub const fn with_beta_1(mut self, value: Float) -> Self {
        self.beta_1 = value;
        self
    }
    /// Set the value for the hyperparameter $`\beta_2`$ (default = `0.999`).
    ///
    /// This represents the exponential decay rate of the second moment estimate, $`v`$.
    pub const fn with_beta_2(mut self, value: Float) -> Self {
        self.beta_2 = value;
        self
    }
    /// Set the value for the divide-by-zero tolerance in the update step (default = `1e-8`).
    pub const fn with_epsilon(mut self, value: Float) -> Self {
        self.epsilon = value;
        self
    }
}
impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            x0: DVector::zeros(0),
            alpha: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// The Adam algorithm.
///
/// This minimization [`Algorithm`] keeps bias-corrected running estimates of the first and second
/// moments of the gradient and scales each coordinate's step by their ratio, as described in
/// [^1]. It terminates by default through an [`EmaLossTerminator`].
///
/// [^1]: [D. P. Kingma and J. Ba, “Adam: A Method for Stochastic Optimization,” 2014, arXiv. doi: 10.48550/ARXIV.1412.6980.](https://doi.org/10.48550/ARXIV.1412.6980)
#[derive(Clone, Default)]
pub struct Adam {
    config: AdamConfig,
    x: DVector<Float>,
    f: Float,
    m: DVector<Float>,
    v: DVector<Float>,
}

impl<P, U, E> Algorithm<P, GradientStatus, U, E> for Adam
where
    P: Gradient<U, E>,
{
    type Summary = MinimizationSummary;
    type Config = AdamConfig;

    fn initialize(
        &mut self,
        config: Self::Config,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        self.config = config;
        self.x = self.config.x0.clone();
        self.f = problem.evaluate(&self.x, args)?;
        status.count_cost();
        status.move_to(self.x.clone(), self.f);
        self.m = DVector::zeros(self.x.len());
        self.v = DVector::zeros(self.x.len());
        Ok(())
    }

    fn step(
        &mut self,
        current_step: usize,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        let g = problem.gradient(&self.x, args)?;
        status.count_gradient();
        self.m = self.m.scale(self.config.beta_1) + g.scale(1.0 - self.config.beta_1);
        self.v = self.v.scale(self.config.beta_2)
            + g.map(|gi| gi.powi(2)).scale(1.0 - self.config.beta_2);
        let t = current_step as i32 + 1;
        let alpha_t = self.config.alpha * (1.0 - self.config.beta_2.powi(t)).sqrt()
            / (1.0 - self.config.beta_1.powi(t));
        self.x -= self
            .m
            .scale(alpha_t)
            .component_div(&self.v.map(|vi| vi.sqrt() + self.config.epsilon));
        self.f = problem.evaluate(&self.x, args)?;
        status.count_cost();
        status.move_to(self.x.clone(), self.f);
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
    fn test_adam() -> Result<(), Infallible> {
        let problem = Sphere { n: 2 };
        for x0 in [[-2.0, 2.0], [2.0, 2.0], [0.5, -0.1]] {
            let result = Adam::default().process(
                &problem,
                &(),
                AdamConfig::default().with_x0(x0).with_alpha(0.05),
                Adam::default_callbacks().with_terminator(MaxSteps(20_000)),
            )?;
            assert!(result.fx < 1e-3, "{x0:?}: {}", result.fx);
        }
        Ok(())
    }

    #[test]
    fn test_first_step_has_length_alpha_per_coordinate() -> Result<(), Infallible> {
        let result = Adam::default().process(
            &Sphere { n: 2 },
            &(),
            AdamConfig::default().with_x0([3.0, -100.0]).with_alpha(0.1),
            Adam::default_callbacks().with_terminator(MaxSteps(1)),
        )?;
        assert_relative_eq!(result.x[0], 2.9, epsilon = 1e-6);
        assert_relative_eq!(result.x[1], -99.9, epsilon = 1e-6);
        Ok(())
    }
}
