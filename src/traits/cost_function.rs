use std::convert::Infallible;

use crate::{DVector, Float};

/// A trait which describes a function $`f(\mathbb{R}^n) \to \mathbb{R}`$
///
/// Such a function may also take an `args: &U` field which can be used to pass external
/// arguments to the function during minimization.
///
/// The `CostFunction` trait takes a generic `U` representing the type of user data/arguments
/// and a generic `E` representing any possible errors that might be returned during function
/// execution.
pub trait CostFunction<U = (), E = Infallible> {
    /// The evaluation of the function at a point `x` with the given arguments/user data.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. Users should implement this trait to return a
    /// [`std::convert::Infallible`] if the function evaluation never fails.
    fn evaluate(&self, x: &DVector<Float>, args: &U) -> Result<Float, E>;
}

/// A trait which defines the gradient of a function $`f(\mathbb{R}^n) \to \mathbb{R}`$, along
/// with Hessian-vector products.
///
/// Both methods default to central finite differences. Implementors with exact derivatives
/// (see [`crate::ad`]) should override them.
pub trait Gradient<U = (), E = Infallible>: CostFunction<U, E> {
    /// The evaluation of the gradient at a point `x` with the given arguments/user data.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. See [`CostFunction::evaluate`] for more
    /// information.
    fn gradient(&self, x: &DVector<Float>, args: &U) -> Result<DVector<Float>, E> {
        let n = x.len();
        let mut grad = DVector::zeros(n);
        // cbrt(eps) * (|x_i| + 1) balances truncation and rounding error for central differences
        let h: DVector<Float> = x.map(|xi| Float::cbrt(Float::EPSILON) * (xi.abs() + 1.0));
        for i in 0..n {
            let mut x_plus = x.clone();
            let mut x_minus = x.clone();
            x_plus[i] += h[i];
            x_minus[i] -= h[i];
            let f_plus = self.evaluate(&x_plus, args)?;
            let f_minus = self.evaluate(&x_minus, args)?;
            grad[i] = (f_plus - f_minus) / (2.0 * h[i]);
        }
        Ok(grad)
    }

    /// The Hessian-vector product $`H(\vec{x})\vec{v}`$ at a point `x`.
    ///
    /// # Errors
    ///
    /// Returns an `Err(E)` if the evaluation fails. See [`CostFunction::evaluate`] for more
    /// information.
    fn hessian_vector_product(
        &self,
        x: &DVector<Float>,
        v: &DVector<Float>,
        args: &U,
    ) -> Result<DVector<Float>, E> {
        let v_norm = v.norm();
        if v_norm == 0.0 {
            return Ok(DVector::zeros(x.len()));
        }
        let h = Float::cbrt(Float::EPSILON) * (x.norm() + 1.0) / v_norm;
        let g_plus = self.gradient(&(x + v.scale(h)), args)?;
        let g_minus = self.gradient(&(x - v.scale(h)), args)?;
        Ok((g_plus - g_minus) / (2.0 * h))
    }
}
