use std::{fmt::Display, ops::ControlFlow, str::FromStr, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::gradient::{
        Adam, AdamConfig, EmaLossTerminator, GradientDescent, GradientDescentConfig,
        GradientStatus, NewtonCG, NewtonCGConfig, NewtonCGGTerminator, RMSProp, RMSPropConfig,
    },
    core::{utils::maybe_warn, Callbacks, DebugObserver, MaxSteps, MinimizationSummary},
    mixture::{
        init::{initialize, InitOptions},
        likelihood, Dataset, Family, FamilyKind, MixtureParameters, MixtureSpec,
        NegativeLogLikelihood, UnconstrainedVector,
    },
    traits::{Algorithm, CostFunction, Terminator},
    DMatrix, DVector, Float, MixtureError, Result,
};

/// Version of the serialized [`ParameterTrace`] layout.
pub const TRACE_SCHEMA_VERSION: u32 = 1;

/// The optimizers a mixture can be fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Optimizer {
    /// Truncated Newton with exact Hessian-vector products (`"Newton-CG"`).
    NewtonCG,
    /// Gradient descent with momentum (`"grad_descent"`).
    GradientDescent,
    /// RMSProp (`"rms_prop"`).
    RMSProp,
    /// Adam (`"adam"`).
    Adam,
}

impl Optimizer {
    /// Every optimizer, in identifier order.
    pub const ALL: [Self; 4] = [Self::NewtonCG, Self::GradientDescent, Self::RMSProp, Self::Adam];

    /// The identifier accepted by [`MixtureModel::fit`].
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::NewtonCG => "Newton-CG",
            Self::GradientDescent => "grad_descent",
            Self::RMSProp => "rms_prop",
            Self::Adam => "adam",
        }
    }
}

impl FromStr for Optimizer {
    type Err = MixtureError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|optimizer| optimizer.identifier() == s)
            .ok_or_else(|| MixtureError::UnknownOptimizer(s.to_string()))
    }
}

impl Display for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Which optimizer to run and how long to let it run.
///
/// Unset values fall back to per-optimizer defaults: 200 steps for Newton-CG and 1000 for the
/// first-order methods, with learning rates of `1e-4` (grad_descent) and `1e-2` (rms_prop and
/// adam).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    optimizer: Optimizer,
    max_steps: Option<usize>,
    learning_rate: Option<Float>,
    gradient_tolerance: Float,
    patience: usize,
}

impl From<Optimizer> for OptimizerConfig {
    fn from(optimizer: Optimizer) -> Self {
        Self::new(optimizer)
    }
}

impl OptimizerConfig {
    /// Defaults for `optimizer`.
    pub fn new(optimizer: Optimizer) -> Self {
        Self {
            optimizer,
            max_steps: None,
            learning_rate: None,
            gradient_tolerance: Float::EPSILON.cbrt(),
            patience: 10,
        }
    }
    /// Set the maximum number of optimizer iterations.
    ///
    /// # Panics
    ///
    /// This method will panic if `max_steps` is zero.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        assert!(max_steps > 0, "at least one step is required");
        self.max_steps = Some(max_steps);
        self
    }
    /// Set the learning rate of a first-order optimizer (ignored by Newton-CG).
    ///
    /// # Panics
    ///
    /// This method will panic if `learning_rate` is not positive and finite.
    pub fn with_learning_rate(mut self, learning_rate: Float) -> Self {
        assert!(
            learning_rate.is_finite() && learning_rate > 0.0,
            "learning rate must be positive and finite"
        );
        self.learning_rate = Some(learning_rate);
        self
    }
    /// Set the gradient-norm tolerance of Newton-CG (default = `cbrt(eps)`).
    ///
    /// # Panics
    ///
    /// This method will panic if `tolerance` is negative.
    pub fn with_gradient_tolerance(mut self, tolerance: Float) -> Self {
        assert!(tolerance >= 0.0, "gradient tolerance must be non-negative");
        self.gradient_tolerance = tolerance;
        self
    }
    /// Set how many flat steps of the loss average stop a first-order optimizer (default = `10`).
    pub const fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }
    /// The optimizer to run.
    pub const fn optimizer(&self) -> Optimizer {
        self.optimizer
    }
    /// The iteration cap after defaults are applied.
    pub fn max_steps(&self) -> usize {
        self.max_steps.unwrap_or(match self.optimizer {
            Optimizer::NewtonCG => 200,
            _ => 1000,
        })
    }
    /// The learning rate after defaults are applied ([`None`] for Newton-CG).
    pub fn learning_rate(&self) -> Option<Float> {
        match self.optimizer {
            Optimizer::NewtonCG => None,
            Optimizer::GradientDescent => Some(self.learning_rate.unwrap_or(1e-4)),
            Optimizer::RMSProp | Optimizer::Adam => Some(self.learning_rate.unwrap_or(1e-2)),
        }
    }
}

/// One snapshot of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// The unconstrained vector.
    pub vector: Vec<Float>,
    /// The mixture parameters it maps to.
    pub parameters: MixtureParameters,
    /// The negative log-likelihood of the training data.
    pub negative_log_likelihood: Float,
}

/// The iterates of a fit: entry `0` is the starting point and entry `i` the state after
/// optimizer iteration `i`. Never empty. A stalled Newton-CG step does not move the iterate and
/// adds no entry, so a stalled fit has one entry fewer than steps taken plus one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTrace {
    version: u32,
    spec: MixtureSpec,
    entries: Vec<TraceEntry>,
}

impl ParameterTrace {
    fn new(spec: MixtureSpec, first: TraceEntry) -> Self {
        Self {
            version: TRACE_SCHEMA_VERSION,
            spec,
            entries: vec![first],
        }
    }

    /// The specification every entry is laid out for.
    pub const fn spec(&self) -> &MixtureSpec {
        &self.spec
    }

    /// Number of entries (at least one).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; a trace holds at least its starting point.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in iteration order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entry `i`, if it exists.
    pub fn get(&self, i: usize) -> Option<&TraceEntry> {
        self.entries.get(i)
    }

    /// The starting point.
    pub fn first(&self) -> &TraceEntry {
        &self.entries[0]
    }

    /// The final iterate.
    pub fn last(&self) -> &TraceEntry {
        &self.entries[self.entries.len() - 1]
    }

    /// The negative log-likelihood of every entry.
    pub fn negative_log_likelihoods(&self) -> Vec<Float> {
        self.entries
            .iter()
            .map(|entry| entry.negative_log_likelihood)
            .collect()
    }

    /// Serialize the trace into a pickle byte string.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if serialization fails.
    pub fn to_pickle(&self) -> Result<Vec<u8>> {
        serde_pickle::to_vec(self, serde_pickle::SerOptions::default()).map_err(|err| {
            MixtureError::InvalidArgument(format!("could not serialize the trace: {err}"))
        })
    }

    /// Read a trace written by [`ParameterTrace::to_pickle`].
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if the bytes are not a trace, the schema version
    /// differs from [`TRACE_SCHEMA_VERSION`], or the trace is empty.
    pub fn from_pickle(bytes: &[u8]) -> Result<Self> {
        let trace: Self = serde_pickle::from_slice(bytes, serde_pickle::DeOptions::default())
            .map_err(|err| {
                MixtureError::InvalidArgument(format!("could not deserialize a trace: {err}"))
            })?;
        if trace.version != TRACE_SCHEMA_VERSION {
            return Err(MixtureError::InvalidArgument(format!(
                "trace schema version {} is not supported (expected {TRACE_SCHEMA_VERSION})",
                trace.version
            )));
        }
        if trace.entries.is_empty() {
            return Err(MixtureError::InvalidArgument(
                "a trace must contain at least one entry".to_string(),
            ));
        }
        Ok(trace)
    }
}

/// Why a fit stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The optimizer's convergence criterion was met.
    Converged,
    /// The iteration cap was reached.
    MaxSteps,
    /// Newton-CG could not find a decrease along its search direction.
    Stalled,
    /// The objective became non-finite; the trace ends at the last finite iterate.
    Degenerate {
        /// What went wrong.
        reason: String,
    },
}

impl Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxSteps => write!(f, "reached the step limit"),
            Self::Stalled => write!(f, "stalled"),
            Self::Degenerate { reason } => write!(f, "degenerate ({reason})"),
        }
    }
}

/// A [`Terminator`] which appends every finite iterate to a trace and stops the run at the first
/// non-finite one.
///
/// It must run before any other terminator so that the final step is always recorded.
struct TraceRecorder {
    spec: MixtureSpec,
    entries: Vec<TraceEntry>,
    degenerate: Option<String>,
}

impl<A, P> Terminator<A, P, GradientStatus, (), MixtureError> for TraceRecorder
where
    A: Algorithm<P, GradientStatus, (), MixtureError>,
{
    fn check_for_termination(
        &mut self,
        current_step: usize,
        _algorithm: &mut A,
        _problem: &P,
        status: &mut GradientStatus,
        _args: &(),
    ) -> ControlFlow<()> {
        if !status.fx.is_finite() {
            let reason = format!(
                "the negative log-likelihood became {} at step {current_step}",
                status.fx
            );
            maybe_warn(&format!("stopping the fit: {reason}"));
            status.with_message("DEGENERATE LIKELIHOOD");
            self.degenerate = Some(reason);
            return ControlFlow::Break(());
        }
        // a failed Newton-CG line search leaves the iterate where it was
        if self
            .entries
            .last()
            .is_some_and(|last| last.vector.as_slice() == status.x.as_slice())
        {
            return ControlFlow::Continue(());
        }
        match self.spec.forward(status.x.as_slice()) {
            Ok(parameters) => {
                log::trace!("step {current_step}: nll = {}", status.fx);
                self.entries.push(TraceEntry {
                    vector: status.x.iter().copied().collect(),
                    parameters,
                    negative_log_likelihood: status.fx,
                });
                ControlFlow::Continue(())
            }
            Err(err) => {
                self.degenerate = Some(err.to_string());
                ControlFlow::Break(())
            }
        }
    }
}

/// $`2p - 2\ell`$
pub fn aic(num_free_params: usize, log_likelihood: Float) -> Float {
    2.0 * num_free_params as Float - 2.0 * log_likelihood
}

/// $`p\ln n - 2\ell`$
pub fn bic(num_free_params: usize, log_likelihood: Float, n: usize) -> Float {
    num_free_params as Float * (n as Float).ln() - 2.0 * log_likelihood
}

/// A dataset and a mixture family, ready to be initialized and fitted.
///
/// # Example
/// ```
/// use mixgrad::mixture::{Dataset, FamilyKind, MixtureModel};
///
/// let rows: Vec<[f64; 2]> = (0..40)
///     .map(|i| {
///         let t = i as f64;
///         let offset = if i % 2 == 0 { -4.0 } else { 4.0 };
///         [offset + (t * 0.7).sin(), (t * 1.3).cos()]
///     })
///     .collect();
/// let model = MixtureModel::new(Dataset::from_rows(&rows)?, FamilyKind::Gmm, None)?;
/// let init = model.init_params(2, 0.1, None, true)?;
/// let fit = model.fit(&init, "Newton-CG")?;
/// let labels = fit.predict()?;
/// assert_eq!(labels.len(), 40);
/// assert!(fit.bic(fit.final_params())?.is_finite());
/// # Ok::<(), mixgrad::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MixtureModel {
    data: Arc<Dataset>,
    family: Family,
}

impl MixtureModel {
    /// Bind `data` to a family. An absent `model_type` selects the family default.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidStructuralParameter`] for an unknown `model_type`.
    pub fn new(data: Dataset, kind: FamilyKind, model_type: Option<&str>) -> Result<Self> {
        Ok(Self::from_family(data, Family::new(kind, model_type)?))
    }

    /// Bind `data` to an already-built family.
    pub fn from_family(data: Dataset, family: Family) -> Self {
        Self {
            data: Arc::new(data),
            family,
        }
    }

    /// The training data.
    pub fn data(&self) -> &Dataset {
        &self.data
    }

    /// The family being fitted.
    pub const fn family(&self) -> Family {
        self.family
    }

    /// The specification for `num_components` components and `q` latent factors.
    ///
    /// # Errors
    ///
    /// See [`MixtureSpec::new`].
    pub fn spec(&self, num_components: usize, q: Option<usize>) -> Result<MixtureSpec> {
        MixtureSpec::new(self.family, num_components, self.data.d(), q)
    }

    /// Draw a starting vector with seed `0`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if `num_components < 1` or exceeds the number of
    /// observations, if `scale` is negative or not finite, and
    /// [`MixtureError::InvalidStructuralParameter`] for a bad `q`.
    pub fn init_params(
        &self,
        num_components: usize,
        scale: Float,
        q: Option<usize>,
        use_kmeans: bool,
    ) -> Result<UnconstrainedVector> {
        self.init_params_with(
            num_components,
            q,
            &InitOptions::default()
                .with_scale(scale)
                .with_kmeans(use_kmeans),
        )
    }

    /// Draw a starting vector with full control over the initialization.
    ///
    /// # Errors
    ///
    /// See [`MixtureModel::init_params`].
    pub fn init_params_with(
        &self,
        num_components: usize,
        q: Option<usize>,
        options: &InitOptions,
    ) -> Result<UnconstrainedVector> {
        initialize(&self.data, &self.spec(num_components, q)?, options)
    }

    /// Fit from `init` with the optimizer named `optimizer`, using its defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::UnknownOptimizer`] for an unsupported identifier, and everything
    /// [`MixtureModel::fit_with`] returns.
    pub fn fit(&self, init: &UnconstrainedVector, optimizer: &str) -> Result<FittedModel> {
        self.fit_with(init, &OptimizerConfig::new(optimizer.parse()?))
    }

    /// Fit from `init` with a configured optimizer.
    ///
    /// A degenerate iterate ends the fit early without an error: the trace keeps every finite
    /// iterate before it and [`FittedModel::termination`] reports
    /// [`Termination::Degenerate`].
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if `init` was drawn for a different family or
    /// feature count, and [`MixtureError::FitFailed`] if the objective is not finite at `init`.
    pub fn fit_with(
        &self,
        init: &UnconstrainedVector,
        config: &OptimizerConfig,
    ) -> Result<FittedModel> {
        let spec = *init.spec();
        if spec.family() != self.family {
            return Err(MixtureError::InvalidArgument(format!(
                "the starting vector was drawn for {} but the model is {}",
                spec.family(),
                self.family
            )));
        }
        let objective = NegativeLogLikelihood::new(spec, self.data.clone())?;
        let x0 = init.values().clone();
        let f0 = objective.evaluate(&x0, &())?;
        if !f0.is_finite() {
            return Err(MixtureError::FitFailed(format!(
                "the negative log-likelihood of {spec} is {f0} at the starting point"
            )));
        }
        let first = TraceEntry {
            vector: x0.iter().copied().collect(),
            parameters: init.parameters()?,
            negative_log_likelihood: f0,
        };
        log::debug!(
            "fitting {spec} to {} observations with {} (nll = {f0})",
            self.data.n(),
            config.optimizer()
        );
        let recorder = Arc::new(RwLock::new(TraceRecorder {
            spec,
            entries: Vec::new(),
            degenerate: None,
        }));
        let summary = run(&objective, &x0, config, recorder.clone())?
            .with_parameter_names(spec.layout().parameter_names());
        let mut recorder = recorder.write();
        let mut trace = ParameterTrace::new(spec, first);
        trace.entries.append(&mut recorder.entries);
        let termination = if let Some(reason) = recorder.degenerate.take() {
            Termination::Degenerate { reason }
        } else if summary.converged {
            Termination::Converged
        } else if summary.steps >= config.max_steps() {
            Termination::MaxSteps
        } else {
            Termination::Stalled
        };
        log::debug!(
            "{} {termination} after {} steps (nll = {})",
            config.optimizer(),
            summary.steps,
            trace.last().negative_log_likelihood
        );
        Ok(FittedModel {
            spec,
            data: self.data.clone(),
            trace,
            summary,
            termination,
            optimizer: config.optimizer(),
        })
    }
}

fn run(
    objective: &NegativeLogLikelihood,
    x0: &DVector<Float>,
    config: &OptimizerConfig,
    recorder: Arc<RwLock<TraceRecorder>>,
) -> Result<MinimizationSummary> {
    let x0 = x0.iter().copied();
    let max_steps = MaxSteps(config.max_steps());
    let plateau = EmaLossTerminator::default().with_patience(config.patience);
    let learning_rate = config.learning_rate().unwrap_or_default();
    match config.optimizer() {
        Optimizer::NewtonCG => NewtonCG::default().process(
            objective,
            &(),
            NewtonCGConfig::default().with_x0(x0),
            Callbacks::empty()
                .with_terminator(recorder)
                .with_observer(DebugObserver)
                .with_terminator(NewtonCGGTerminator {
                    eps_abs: config.gradient_tolerance,
                })
                .with_terminator(max_steps),
        ),
        Optimizer::GradientDescent => GradientDescent::default().process(
            objective,
            &(),
            GradientDescentConfig::default()
                .with_x0(x0)
                .with_learning_rate(learning_rate),
            Callbacks::empty()
                .with_terminator(recorder)
                .with_observer(DebugObserver)
                .with_terminator(plateau)
                .with_terminator(max_steps),
        ),
        Optimizer::RMSProp => RMSProp::default().process(
            objective,
            &(),
            RMSPropConfig::default()
                .with_x0(x0)
                .with_learning_rate(learning_rate),
            Callbacks::empty()
                .with_terminator(recorder)
                .with_observer(DebugObserver)
                .with_terminator(plateau)
                .with_terminator(max_steps),
        ),
        Optimizer::Adam => Adam::default().process(
            objective,
            &(),
            AdamConfig::default().with_x0(x0).with_alpha(learning_rate),
            Callbacks::empty()
                .with_terminator(recorder)
                .with_observer(DebugObserver)
                .with_terminator(plateau)
                .with_terminator(max_steps),
        ),
    }
}

/// The result of [`MixtureModel::fit_with`]: the trace and everything needed for inference.
#[derive(Debug, Clone)]
pub struct FittedModel {
    spec: MixtureSpec,
    data: Arc<Dataset>,
    trace: ParameterTrace,
    summary: MinimizationSummary,
    termination: Termination,
    optimizer: Optimizer,
}

impl FittedModel {
    /// The fitted specification.
    pub const fn spec(&self) -> &MixtureSpec {
        &self.spec
    }

    /// The training data.
    pub fn data(&self) -> &Dataset {
        &self.data
    }

    /// Every iterate of the fit.
    pub const fn trace(&self) -> &ParameterTrace {
        &self.trace
    }

    /// The parameters of the last trace entry.
    pub fn final_params(&self) -> &MixtureParameters {
        &self.trace.last().parameters
    }

    /// The optimizer's own summary (step and evaluation counts, final message).
    pub const fn summary(&self) -> &MinimizationSummary {
        &self.summary
    }

    /// Why the fit stopped.
    pub const fn termination(&self) -> &Termination {
        &self.termination
    }

    /// The optimizer that produced the trace.
    pub const fn optimizer(&self) -> Optimizer {
        self.optimizer
    }

    /// The structural parameter count used by [`FittedModel::aic`] and [`FittedModel::bic`].
    pub fn num_free_params(&self) -> usize {
        self.spec.num_free_params()
    }

    /// Posterior component probabilities of every row of `data` under `params`.
    ///
    /// # Errors
    ///
    /// See [`likelihood::responsibilities`].
    pub fn responsibilities(
        &self,
        data: &Dataset,
        params: &MixtureParameters,
    ) -> Result<DMatrix<Float>> {
        likelihood::responsibilities(data, params)
    }

    /// The most probable component of every row of `data` under `params` (lowest index on
    /// ties).
    ///
    /// # Errors
    ///
    /// See [`likelihood::responsibilities`].
    pub fn labels(&self, data: &Dataset, params: &MixtureParameters) -> Result<Vec<usize>> {
        let resp = self.responsibilities(data, params)?;
        Ok(resp
            .row_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, Float::NEG_INFINITY), |best, (c, &p)| {
                        if p > best.1 {
                            (c, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Labels of the training data under the final parameters.
    ///
    /// # Errors
    ///
    /// See [`FittedModel::labels`].
    pub fn predict(&self) -> Result<Vec<usize>> {
        self.labels(&self.data, self.final_params())
    }

    /// The log-likelihood of the training data under `params`.
    ///
    /// # Errors
    ///
    /// See [`likelihood::log_likelihood`].
    pub fn likelihood(&self, params: &MixtureParameters) -> Result<Float> {
        likelihood::log_likelihood(&self.data, params)
    }

    /// Akaike information criterion of `params` on the training data.
    ///
    /// # Errors
    ///
    /// See [`FittedModel::likelihood`].
    pub fn aic(&self, params: &MixtureParameters) -> Result<Float> {
        Ok(aic(self.num_free_params(), self.likelihood(params)?))
    }

    /// Bayesian information criterion of `params` on the training data.
    ///
    /// # Errors
    ///
    /// See [`FittedModel::likelihood`].
    pub fn bic(&self, params: &MixtureParameters) -> Result<Float> {
        Ok(bic(
            self.num_free_params(),
            self.likelihood(params)?,
            self.data.n(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::mixture::fixtures;

    fn gmm(data: Dataset) -> MixtureModel {
        MixtureModel::new(data, FamilyKind::Gmm, None).unwrap()
    }

    #[test]
    fn optimizer_identifiers_round_trip() {
        for optimizer in Optimizer::ALL {
            assert_eq!(optimizer.identifier().parse::<Optimizer>(), Ok(optimizer));
        }
        assert_eq!(
            "bogus".parse::<Optimizer>(),
            Err(MixtureError::UnknownOptimizer("bogus".to_string()))
        );
        assert!("adam ".parse::<Optimizer>().is_err());
        assert!("newton-cg".parse::<Optimizer>().is_err());
    }

    #[test]
    fn every_optimizer_produces_a_usable_fit() {
        let model = gmm(fixtures::two_blobs(40, 1));
        let init = model.init_params(2, 0.1, None, true).unwrap();
        for optimizer in Optimizer::ALL {
            let fit = model
                .fit_with(&init, &OptimizerConfig::new(optimizer).with_max_steps(50))
                .unwrap();
            assert!(!fit.trace().is_empty());
            assert_eq!(fit.trace().first().vector, init.values().as_slice());
            if fit.termination() == &Termination::Stalled {
                assert_eq!(fit.trace().len(), fit.summary().steps, "{optimizer}");
            } else {
                assert_eq!(fit.trace().len(), fit.summary().steps + 1, "{optimizer}");
            }
            let vectors: Vec<_> = fit.trace().entries().iter().map(|e| &e.vector).collect();
            assert!(vectors.windows(2).all(|w| w[0] != w[1]), "{optimizer}");
            assert!(!matches!(fit.termination(), Termination::Degenerate { .. }));
            let labels = fit.predict().unwrap();
            assert_eq!(labels.len(), 80);
            assert!(labels.iter().all(|&l| l < 2));
            assert!(fit.trace().last().negative_log_likelihood.is_finite());
        }
    }

    #[test]
    fn newton_cg_trace_is_non_increasing() {
        let model = gmm(fixtures::two_blobs(100, 2));
        let init = model.init_params(2, 0.5, None, true).unwrap();
        let fit = model.fit(&init, "Newton-CG").unwrap();
        let nll = fit.trace().negative_log_likelihoods();
        for pair in nll.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9 * pair[0].abs(), "{pair:?}");
        }
        assert!(matches!(
            fit.termination(),
            Termination::Converged | Termination::Stalled
        ));
    }

    #[test]
    fn predict_is_idempotent() {
        let model = gmm(fixtures::two_blobs(30, 3));
        let init = model.init_params(2, 0.2, None, false).unwrap();
        let fit = model.fit(&init, "adam").unwrap();
        let params = fit.final_params();
        assert_eq!(
            fit.labels(model.data(), params).unwrap(),
            fit.labels(model.data(), params).unwrap()
        );
    }

    #[test]
    fn labels_break_ties_toward_the_lowest_component() {
        let model = gmm(fixtures::two_blobs(10, 4));
        let spec = model.spec(2, None).unwrap();
        // both components identical: zero logit, equal means, identity covariances
        let init = UnconstrainedVector::new(spec, DVector::zeros(spec.dimension())).unwrap();
        let fit = model
            .fit_with(&init, &OptimizerConfig::new(Optimizer::Adam).with_max_steps(1))
            .unwrap();
        let params = init.parameters().unwrap();
        assert!(fit.labels(model.data(), &params).unwrap().iter().all(|&l| l == 0));
    }

    #[test]
    fn information_criteria_follow_their_definitions() {
        assert_relative_eq!(aic(5, -100.0), 210.0);
        assert_relative_eq!(bic(5, -100.0, 100), 5.0 * (100.0 as Float).ln() + 200.0);
        let model = gmm(fixtures::two_blobs(25, 5));
        let fit = model
            .fit(&model.init_params(2, 0.1, None, true).unwrap(), "rms_prop")
            .unwrap();
        let params = fit.final_params();
        let ll = fit.likelihood(params).unwrap();
        assert_relative_eq!(ll, -fit.trace().last().negative_log_likelihood);
        assert_eq!(fit.num_free_params(), 1 + 4 + 6);
        assert_relative_eq!(fit.aic(params).unwrap(), 2.0 * 11.0 - 2.0 * ll);
        assert_relative_eq!(
            fit.bic(params).unwrap(),
            11.0 * (50.0 as Float).ln() - 2.0 * ll
        );
    }

    #[test]
    fn richer_structures_have_more_free_parameters() {
        let data = fixtures::iris_like(6);
        let count = |model_type: &str| {
            MixtureModel::new(data.clone(), FamilyKind::Mclust, Some(model_type))
                .unwrap()
                .spec(3, None)
                .unwrap()
                .num_free_params()
        };
        assert!(count("VVV") >= count("EII"));
        assert!(count("VVV") > count("EEE"));
    }

    #[test]
    fn rejects_invalid_requests() {
        let model = gmm(fixtures::two_blobs(10, 7));
        assert!(model
            .init_params(0, 0.1, None, true)
            .unwrap_err()
            .is_invalid_argument());
        let mfa = MixtureModel::new(fixtures::two_blobs(10, 7), FamilyKind::Mfa, None).unwrap();
        assert!(mfa
            .init_params(2, 0.1, Some(2), true)
            .unwrap_err()
            .is_invalid_argument());
        let pgmm = MixtureModel::new(fixtures::two_blobs(10, 7), FamilyKind::Pgmm, Some("UUU"))
            .unwrap();
        let err = pgmm.init_params(2, 0.1, Some(2), true).unwrap_err();
        assert!(matches!(err, MixtureError::InvalidStructuralParameter(_)));
        assert!(err.is_invalid_argument());
        let init = model.init_params(2, 0.1, None, true).unwrap();
        assert_eq!(
            model.fit(&init, "bogus").unwrap_err(),
            MixtureError::UnknownOptimizer("bogus".to_string())
        );
        let tied =
            MixtureModel::new(fixtures::two_blobs(10, 7), FamilyKind::GmmConstrained, None)
                .unwrap();
        assert!(tied.fit(&init, "adam").unwrap_err().is_invalid_argument());
        assert!(MixtureModel::new(fixtures::two_blobs(10, 7), FamilyKind::Pgmm, Some("XYZ"))
            .is_err());
    }

    #[test]
    fn collapsed_start_is_a_failed_fit() {
        let model = gmm(fixtures::two_blobs(10, 8));
        let spec = model.spec(1, None).unwrap();
        let init =
            UnconstrainedVector::new(spec, DVector::from_vec(vec![0.0, 0.0, -400.0, 0.0, 0.0]))
                .unwrap();
        assert!(matches!(
            model.fit(&init, "Newton-CG"),
            Err(MixtureError::FitFailed(_))
        ));
    }

    #[test]
    fn recorder_stops_at_a_non_finite_objective() {
        let data = Arc::new(fixtures::two_blobs(10, 9));
        let spec = MixtureSpec::new(Family::Gmm, 1, 2, None).unwrap();
        let objective = NegativeLogLikelihood::new(spec, data).unwrap();
        let mut recorder = TraceRecorder {
            spec,
            entries: Vec::new(),
            degenerate: None,
        };
        let mut algorithm = GradientDescent::default();
        let mut status = GradientStatus::default();
        status.move_to(DVector::zeros(5), 12.5);
        assert!(recorder
            .check_for_termination(0, &mut algorithm, &objective, &mut status, &())
            .is_continue());
        status.move_to(DVector::zeros(5), Float::INFINITY);
        assert!(recorder
            .check_for_termination(1, &mut algorithm, &objective, &mut status, &())
            .is_break());
        assert_eq!(recorder.entries.len(), 1);
        assert!(recorder.degenerate.is_some());
        assert_eq!(status.message, "DEGENERATE LIKELIHOOD");
    }

    #[test]
    fn recorder_skips_an_unmoved_iterate() {
        let data = Arc::new(fixtures::two_blobs(10, 9));
        let spec = MixtureSpec::new(Family::Gmm, 1, 2, None).unwrap();
        let objective = NegativeLogLikelihood::new(spec, data).unwrap();
        let mut recorder = TraceRecorder {
            spec,
            entries: Vec::new(),
            degenerate: None,
        };
        let mut algorithm = NewtonCG::<(), MixtureError>::default();
        let mut status = GradientStatus::default();
        status.move_to(DVector::zeros(5), 12.5);
        for step in 0..2 {
            assert!(recorder
                .check_for_termination(step, &mut algorithm, &objective, &mut status, &())
                .is_continue());
        }
        assert_eq!(recorder.entries.len(), 1);
        status.move_to(DVector::from_element(5, 0.1), 12.0);
        assert!(recorder
            .check_for_termination(2, &mut algorithm, &objective, &mut status, &())
            .is_continue());
        assert_eq!(recorder.entries.len(), 2);
        assert!(recorder.degenerate.is_none());
    }

    #[test]
    fn trace_survives_a_pickle_round_trip() {
        let model = MixtureModel::new(fixtures::two_blobs(15, 10), FamilyKind::Tmm, None).unwrap();
        let init = model.init_params(2, 0.1, None, true).unwrap();
        let fit = model
            .fit_with(&init, &OptimizerConfig::new(Optimizer::Adam).with_max_steps(5))
            .unwrap();
        let bytes = fit.trace().to_pickle().unwrap();
        assert_eq!(&ParameterTrace::from_pickle(&bytes).unwrap(), fit.trace());
        assert!(ParameterTrace::from_pickle(b"not a pickle").is_err());
    }
}
