//! `mixgrad` fits finite mixture models by minimizing their negative log-likelihood with
//! gradient-based and second-order optimizers, using exact derivatives from automatic
//! differentiation.
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Quick Start](#quick-start)
//! - [Parameterization](#parameterization)
//! - [Warnings](#warnings)
//!
//! # Key Features
//! * Six families: full-covariance Gaussian mixtures (`GMM`), tied-covariance Gaussian mixtures
//!   (`GMM-Constrained`), the fourteen eigen-decomposed `MCLUST` structures, mixtures of factor
//!   analyzers (`MFA`), the eight parsimonious `PGMM` structures, and mixtures of multivariate t
//!   distributions (`TMM`).
//! * Exact gradients and Hessian-vector products from the [`ad`] module, so every structure is
//!   optimizable without hand-derived update rules.
//! * Four optimizers (`"Newton-CG"`, `"grad_descent"`, `"rms_prop"`, `"adam"`) built on a small
//!   trait-based framework ([`traits::Algorithm`], [`traits::Terminator`]).
//! * A full parameter trace per fit, responsibility-based labels, and AIC/BIC.
//!
//! # Quick Start
//!
//! ```rust
//! use mixgrad::mixture::{Dataset, FamilyKind, MixtureModel, Termination};
//!
//! let rows: Vec<[f64; 2]> = (0..60)
//!     .map(|i| {
//!         let t = i as f64;
//!         let center = if i < 30 { [-3.0, 0.0] } else { [3.0, 1.0] };
//!         [center[0] + (t * 0.37).sin(), center[1] + (t * 0.91).cos()]
//!     })
//!     .collect();
//! let model = MixtureModel::new(Dataset::from_rows(&rows)?, FamilyKind::Mclust, Some("VVI"))?;
//! let init = model.init_params(2, 0.1, None, true)?;
//! let fit = model.fit(&init, "Newton-CG")?;
//! assert!(!matches!(fit.termination(), Termination::Degenerate { .. }));
//! let labels = fit.predict()?;
//! assert_ne!(labels[0], labels[59]);
//! println!("{}", fit.summary());
//! println!("BIC = {}", fit.bic(fit.final_params())?);
//! # Ok::<(), mixgrad::MixtureError>(())
//! ```
//!
//! # Parameterization
//! Every family is fitted in unconstrained coordinates which map onto valid parameters for any
//! finite input:
//! * mixing weights are a softmax of `k - 1` logits (the last is pinned at zero),
//! * full covariances are $`LL^\intercal`$ with a log-parameterized Cholesky diagonal,
//! * `MCLUST` covariances are $`\lambda DAD^\intercal`$ with $`\lambda = e^v`$, a unit-determinant
//!   log-parameterized shape $`A`$, and an orientation $`D`$ given by the Cayley transform of a
//!   skew-symmetric matrix,
//! * factor covariances are $`\Lambda\Lambda^\intercal + \Psi`$ with log error variances,
//! * t degrees of freedom are $`\nu = e^\eta`$.
//!
//! See [`mixture::MixtureSpec::layout`] for the exact ordering.
//!
//! # Warnings
//! Degenerate stops and empty k-means clusters are reported through the [`log`] facade at the
//! `warn` level. They can be silenced with [`core::utils::disable_warnings`] or by setting the
//! environment variable `MIXGRAD_WARNINGS=0`.
#![warn(
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::doc_link_with_quotes,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::perf,
    clippy::style,
    missing_docs
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Automatic differentiation.
pub mod ad;
/// Module containing minimization algorithms.
pub mod algorithms;
/// Module containing the optimizer driver's shared types.
pub mod core;
/// Module containing the [`MixtureError`] type.
pub mod error;
/// Scalar-generic dense linear algebra.
pub mod linalg;
/// Mixture models.
pub mod mixture;
/// Module containing standard functions for testing algorithms.
pub mod test_functions;
/// Module containing the traits for defining problems and algorithms.
pub mod traits;

pub use error::{MixtureError, Result};

/// The floating-point type used throughout the crate.
pub type Float = f64;

pub use nalgebra::{DMatrix, DVector};

/// Prelude module containing everything someone should need to fit mixtures.
pub mod prelude {
    pub use crate::{
        mixture::{
            Dataset, Family, FamilyKind, FittedModel, InitOptions, MixtureModel, Optimizer,
            OptimizerConfig, Termination,
        },
        traits::{Algorithm, CostFunction, Gradient},
        Float, MixtureError,
    };
}
