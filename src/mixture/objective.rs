use std::sync::Arc;

use crate::{
    ad::{self, Differentiable, Scalar},
    mixture::{likelihood, Dataset, MixtureSpec},
    traits::{CostFunction, Gradient},
    DVector, Float, MixtureError, Result,
};

/// The negative log-likelihood of a dataset as a function of the unconstrained vector.
///
/// Plain evaluation goes through [`likelihood::log_likelihood`], so a collapsed covariance or a
/// non-finite value is reported as $`+\infty`$ rather than an error. Line searches reject such
/// points and the fit driver stops on them. Gradients and Hessian-vector products are exact,
/// taken by [`ad`] through [`MixtureSpec::forward`] and [`likelihood::total_log_likelihood`].
#[derive(Clone)]
pub struct NegativeLogLikelihood {
    spec: MixtureSpec,
    data: Arc<Dataset>,
}

impl NegativeLogLikelihood {
    /// Bind a specification to a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if the dataset has a different number of
    /// features than `spec`.
    pub fn new(spec: MixtureSpec, data: Arc<Dataset>) -> Result<Self> {
        if data.d() != spec.d() {
            return Err(MixtureError::InvalidArgument(format!(
                "the data have {} features but {spec} expects {}",
                data.d(),
                spec.d()
            )));
        }
        Ok(Self { spec, data })
    }

    /// The specification being fitted.
    pub const fn spec(&self) -> &MixtureSpec {
        &self.spec
    }

    /// The dataset being fitted.
    pub fn data(&self) -> &Dataset {
        &self.data
    }

    fn check_len(&self, x: &DVector<Float>) -> Result<()> {
        let expected = self.spec.dimension();
        if x.len() == expected {
            Ok(())
        } else {
            Err(MixtureError::InvalidArgument(format!(
                "expected an unconstrained vector of length {expected} for {} (got {})",
                self.spec,
                x.len()
            )))
        }
    }
}

impl Differentiable for NegativeLogLikelihood {
    fn eval<S: Scalar>(&self, x: &[S]) -> S {
        self.spec.forward(x).map_or_else(
            |_| S::from_f64(Float::NAN),
            |params| -likelihood::total_log_likelihood(&self.data, &params),
        )
    }
}

impl CostFunction<(), MixtureError> for NegativeLogLikelihood {
    fn evaluate(&self, x: &DVector<Float>, _args: &()) -> Result<Float> {
        let params = self.spec.forward(x.as_slice())?;
        match likelihood::log_likelihood(&self.data, &params) {
            Ok(ll) => Ok(-ll),
            Err(MixtureError::DegenerateLikelihood { .. }) => Ok(Float::INFINITY),
            Err(err) => Err(err),
        }
    }
}

impl Gradient<(), MixtureError> for NegativeLogLikelihood {
    fn gradient(&self, x: &DVector<Float>, _args: &()) -> Result<DVector<Float>> {
        self.check_len(x)?;
        let (_, gradient) = ad::value_and_gradient(self, x.as_slice());
        Ok(DVector::from_vec(gradient))
    }

    fn hessian_vector_product(
        &self,
        x: &DVector<Float>,
        v: &DVector<Float>,
        _args: &(),
    ) -> Result<DVector<Float>> {
        self.check_len(x)?;
        self.check_len(v)?;
        Ok(DVector::from_vec(ad::hessian_vector_product(
            self,
            x.as_slice(),
            v.as_slice(),
        )))
    }
}
