use thiserror::Error;

/// Errors produced while specifying, initializing, or fitting a mixture model.
///
/// Every error aborts the call that produced it; no partially constructed
/// [`FittedModel`](crate::mixture::FittedModel) is ever returned alongside one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixtureError {
    /// Malformed caller input (bad data shape, non-finite entries, `k < 1`, bad scale...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A structural parameter (`q`, covariance code, `model_type`) is out of range or unknown.
    #[error("Invalid structural parameter: {0}")]
    InvalidStructuralParameter(String),

    /// The likelihood collapsed (a covariance factor lost positive-definiteness or the value
    /// became non-finite).
    #[error("Degenerate likelihood: {reason}")]
    DegenerateLikelihood {
        /// What collapsed.
        reason: String,
    },

    /// The objective could not be evaluated at the starting point.
    #[error("Fit failed: {0}")]
    FitFailed(String),

    /// The optimizer identifier is not one of the supported names.
    #[error(
        "Unknown optimizer \"{0}\" (expected one of \"Newton-CG\", \"grad_descent\", \"rms_prop\", \"adam\")"
    )]
    UnknownOptimizer(String),
}

impl MixtureError {
    /// Returns `true` for caller-input errors, which includes structural parameter errors.
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidStructuralParameter(_)
        )
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateLikelihood {
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T, E = MixtureError> = std::result::Result<T, E>;
