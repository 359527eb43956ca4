//! Finite mixture models: family specifications, the parameterization of their unconstrained
//! coordinates, likelihood evaluation, initialization, and the fitting API.

/// [`Dataset`] type for validated data matrices.
pub mod dataset;
/// Mixture families and their structural codes.
pub mod family;
/// Starting points for fits.
pub mod init;
/// Log-likelihoods and responsibilities.
pub mod likelihood;
/// [`MixtureModel`] and [`FittedModel`].
pub mod model;
/// The negative log-likelihood as an optimizer cost function.
pub mod objective;
/// Layout of, and forward map from, the unconstrained vector.
pub mod params;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dataset::Dataset;
pub use family::{Family, FamilyKind, MclustCode, MixtureSpec, PgmmCode, Tie};
pub use init::{initialize, InitOptions};
pub use likelihood::{log_likelihood, responsibilities, COLLAPSE_TOLERANCE};
pub use model::{
    aic, bic, FittedModel, MixtureModel, Optimizer, OptimizerConfig, ParameterTrace, Termination,
    TraceEntry,
};
pub use objective::NegativeLogLikelihood;
pub use params::{
    BlockKind, Covariance, MixtureParameters, ParameterBlock, ParameterLayout,
    UnconstrainedVector,
};
