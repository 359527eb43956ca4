use crate::{
    algorithms::gradient::{summarize_status, EmaLossTerminator, GradientStatus},
    core::{Callbacks, MinimizationSummary},
    traits::{Algorithm, Gradient},
    DVector, Float,
};

/// The internal configuration struct for the [`RMSProp`] algorithm.
#[derive(Clone)]
pub struct RMSPropConfig {
    x0: DVector<Float>,
    learning_rate: Float,
    decay: Float,
    epsilon: Float,
}
impl Default for RMSPropConfig {
    fn default() -> Self {
        Self {
            x0: DVector::zeros(0),
            learning_rate: 1e-2,
            decay: 0.9,
            epsilon: 1e-8,
        }
    }
}
impl RMSPropConfig {
    /// Set the starting position of the algorithm.
    pub fn with_x0<I: IntoIterator<Item = Float>>(mut self, x0: I) -> Self {
        self.x0 = DVector::from_vec(x0.into_iter().collect());
        self
    }
    /// Set the learning rate $`\eta`$ (default = `1e-2`).
    pub const fn with_learning_rate(mut self, value: Float) -> Self {
        self.learning_rate = value;
        self
    }
    /// Set the decay $`\rho`$ of the squared-gradient average (default = `0.9`).
    pub const fn with_decay(mut self, value: Float) -> Self {
        self.decay = value;
        self
    }
    /// Set the value for the divide-by-zero tolerance in the update step (default = `1e-8`).
    pub const fn with_epsilon(mut self, value: Float) -> Self {
        self.epsilon = value;
        self
    }
}

/// The RMSProp algorithm, which divides each coordinate's step by a running root-mean-square of
/// its gradient:
///
/// ```math
/// \vec{s}_{t+1} = \rho\vec{s}_t + (1 - \rho)(\nabla f)^2, \qquad
/// \vec{x}_{t+1} = \vec{x}_t - \frac{\eta\nabla f}{\sqrt{\vec{s}_{t+1}} + \epsilon}
/// ```
#[derive(Clone, Default)]
pub struct RMSProp {
    config: RMSPropConfig,
    x: DVector<Float>,
    mean_square: DVector<Float>,
}

impl<P, U, E> Algorithm<P, GradientStatus, U, E> for RMSProp
where
    P: Gradient<U, E>,
{
    type Summary = MinimizationSummary;
    type Config = RMSPropConfig;

    fn initialize(
        &mut self,
        config: Self::Config,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        self.config = config;
        self.x = self.config.x0.clone();
        self.mean_square = DVector::zeros(self.x.len());
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
        self.mean_square = self.mean_square.scale(self.config.decay)
            + g.map(|gi| gi.powi(2)).scale(1.0 - self.config.decay);
        self.x -= g.scale(self.config.learning_rate).component_div(
            &self
                .mean_square
                .map(|si| si.sqrt() + self.config.epsilon),
        );
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
