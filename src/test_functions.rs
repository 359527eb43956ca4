//! Standard optimization test problems with exact derivatives.
use std::convert::Infallible;

use crate::{
    ad::{self, Differentiable, Scalar},
    traits::{CostFunction, Gradient},
    DVector, Float,
};

/// The Rosenbrock function, a non-convex function with a single minimum.
///
/// ```math
/// f(\vec{x}) = \sum_{i=1}^{n-1} \left[100(x_{i+1} - x_i^2)^2 + (1 - x_i)^2 \right]
/// ```
/// where $`n \geq 2`$. This function has a minimum at $`f(\vec{1}) = 0`$.
pub struct Rosenbrock {
    /// Number of dimensions (must be at least 2)
    pub n: usize,
}
impl Differentiable for Rosenbrock {
    fn eval<S: Scalar>(&self, x: &[S]) -> S {
        (0..(self.n - 1))
            .map(|i| {
                let a = x[i + 1] - x[i] * x[i];
                let b = S::one() - x[i];
                (a * a).scale(100.0) + b * b
            })
            .sum()
    }
}

/// A generalized spherical function with a single minimum.
///
/// ```math
/// f(\vec{x}) = \sum_{i=1}^{n} x_i^2
/// ```
/// The global minimum is at $`f(\vec{0}) = 0`$.
pub struct Sphere {
    /// Number of dimensions
    pub n: usize,
}
impl Differentiable for Sphere {
    fn eval<S: Scalar>(&self, x: &[S]) -> S {
        x.iter().take(self.n).map(|&xi| xi * xi).sum()
    }
}

macro_rules! exact_derivatives {
    ($($problem:ty),*) => {$(
        impl CostFunction for $problem {
            fn evaluate(&self, x: &DVector<Float>, _args: &()) -> Result<Float, Infallible> {
                Ok(self.eval(x.as_slice()))
            }
        }
        impl Gradient for $problem {
            fn gradient(&self, x: &DVector<Float>, _args: &()) -> Result<DVector<Float>, Infallible> {
                Ok(DVector::from_vec(ad::value_and_gradient(self, x.as_slice()).1))
            }
            fn hessian_vector_product(
                &self,
                x: &DVector<Float>,
                v: &DVector<Float>,
                _args: &(),
            ) -> Result<DVector<Float>, Infallible> {
                Ok(DVector::from_vec(ad::hessian_vector_product(
                    self,
                    x.as_slice(),
                    v.as_slice(),
                )))
            }
        }
    )*};
}
exact_derivatives!(Rosenbrock, Sphere);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rosenbrock_derivatives() {
        let x = DVector::from_vec(vec![-1.2, 1.0]);
        let problem = Rosenbrock { n: 2 };
        assert_relative_eq!(problem.evaluate(&x, &()).unwrap(), 24.2, epsilon = 1e-12);
        let g = problem.gradient(&x, &()).unwrap();
        assert_relative_eq!(g[0], -215.6, epsilon = 1e-10);
        assert_relative_eq!(g[1], -88.0, epsilon = 1e-10);
        // H = [[1200x^2 - 400y + 2, -400x], [-400x, 200]]
        let hv = problem
            .hessian_vector_product(&x, &DVector::from_vec(vec![1.0, 0.0]), &())
            .unwrap();
        assert_relative_eq!(hv[0], 1330.0, epsilon = 1e-9);
        assert_relative_eq!(hv[1], 480.0, epsilon = 1e-9);
    }

    #[test]
    fn sphere_minimum() {
        let problem = Sphere { n: 3 };
        let x = DVector::zeros(3);
        assert_eq!(problem.evaluate(&x, &()).unwrap(), 0.0);
        assert_eq!(problem.gradient(&x, &()).unwrap(), DVector::zeros(3));
    }
}
