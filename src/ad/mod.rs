//! Automatic differentiation.
//!
//! Objectives implement [`Differentiable`] once, generically over [`Scalar`]. The same code then
//! runs on:
//! - `f64` for plain evaluation,
//! - [`Var<f64>`] for a reverse-mode gradient (one forward and one backward sweep),
//! - [`Var<Dual>`] for forward-over-reverse Hessian-vector products.
//!
//! # Example
//! ```
//! use mixgrad::ad::{self, Differentiable, Scalar};
//!
//! struct Paraboloid;
//! impl Differentiable for Paraboloid {
//!     fn eval<S: Scalar>(&self, x: &[S]) -> S {
//!         x[0] * x[0] + x[0] * x[1].scale(3.0)
//!     }
//! }
//!
//! let (value, gradient) = ad::value_and_gradient(&Paraboloid, &[1.0, 2.0]);
//! assert_eq!(value, 7.0);
//! assert_eq!(gradient, vec![8.0, 3.0]);
//! let hv = ad::hessian_vector_product(&Paraboloid, &[1.0, 2.0], &[1.0, 0.0]);
//! assert_eq!(hv, vec![2.0, 3.0]);
//! ```

/// Forward-mode dual numbers.
pub mod dual;
/// The [`Scalar`] trait.
pub mod scalar;
/// Gamma-family special functions.
pub mod special;
/// Reverse-mode tape.
pub mod tape;

pub use dual::Dual;
pub use scalar::Scalar;
pub use tape::{Tape, TapeScalar, Var};

/// A scalar function of a flat parameter vector, written once for every [`Scalar`].
pub trait Differentiable {
    /// Evaluate the function at `x`.
    fn eval<S: Scalar>(&self, x: &[S]) -> S;
}

fn adjoints_of_inputs<T: TapeScalar>(output: &Var<T>, inputs: &[Var<T>]) -> Vec<T> {
    T::with_tape(|tape| {
        let adjoints = output
            .index()
            .map_or_else(|| vec![T::zero(); tape.len()], |idx| tape.backward(idx));
        let result = inputs
            .iter()
            .map(|v| v.index().map_or_else(T::zero, |idx| adjoints[idx]))
            .collect();
        tape.clear();
        result
    })
}

/// Evaluate `f` and its exact gradient at `x`.
///
/// Uses the calling thread's `f64` tape; `f` must not itself request gradients.
pub fn value_and_gradient<F: Differentiable>(f: &F, x: &[f64]) -> (f64, Vec<f64>) {
    f64::with_tape(Tape::clear);
    let inputs: Vec<Var<f64>> = x.iter().map(|&xi| Var::input(xi)).collect();
    let output = f.eval(&inputs);
    let gradient = adjoints_of_inputs(&output, &inputs);
    (output.val(), gradient)
}

/// Evaluate `f`, its gradient, and the Hessian-vector product $`H(x)\,v`$, all exactly.
///
/// # Panics
///
/// Panics if `x` and `v` have different lengths.
pub fn value_gradient_hvp<F: Differentiable>(
    f: &F,
    x: &[f64],
    v: &[f64],
) -> (f64, Vec<f64>, Vec<f64>) {
    assert_eq!(
        x.len(),
        v.len(),
        "direction must have the same length as the point"
    );
    Dual::with_tape(Tape::clear);
    let inputs: Vec<Var<Dual>> = x
        .iter()
        .zip(v)
        .map(|(&xi, &vi)| Var::input(Dual::new(xi, vi)))
        .collect();
    let output = f.eval(&inputs);
    let adjoints = adjoints_of_inputs(&output, &inputs);
    (
        output.val().val,
        adjoints.iter().map(|a| a.val).collect(),
        adjoints.iter().map(|a| a.dot).collect(),
    )
}

/// The exact Hessian-vector product $`H(x)\,v`$.
///
/// # Panics
///
/// Panics if `x` and `v` have different lengths.
pub fn hessian_vector_product<F: Differentiable>(f: &F, x: &[f64], v: &[f64]) -> Vec<f64> {
    value_gradient_hvp(f, x, v).2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct LogSumOfSquares;
    impl Differentiable for LogSumOfSquares {
        fn eval<S: Scalar>(&self, x: &[S]) -> S {
            (S::one() + x.iter().map(|&xi| xi * xi).sum::<S>()).ln()
        }
    }

    #[test]
    fn gradient_matches_closed_form() {
        let x = [0.5, -1.0, 2.0];
        let (value, grad) = value_and_gradient(&LogSumOfSquares, &x);
        let s = 1.0 + 0.25 + 1.0 + 4.0;
        assert_relative_eq!(value, f64::ln(s), epsilon = 1e-14);
        for (g, xi) in grad.iter().zip(&x) {
            assert_relative_eq!(*g, 2.0 * xi / s, epsilon = 1e-14);
        }
    }

    #[test]
    fn hvp_matches_closed_form() {
        // H = 2I/s - 4 x x^T / s^2
        let x = [0.5, -1.0, 2.0];
        let v = [1.0, 2.0, -0.5];
        let s = 6.25;
        let xv: f64 = x.iter().zip(&v).map(|(a, b)| a * b).sum();
        let (_, grad, hv) = value_gradient_hvp(&LogSumOfSquares, &x, &v);
        for i in 0..3 {
            let expected = 2.0 * v[i] / s - 4.0 * x[i] * xv / (s * s);
            assert_relative_eq!(hv[i], expected, epsilon = 1e-14);
            assert_relative_eq!(grad[i], 2.0 * x[i] / s, epsilon = 1e-14);
        }
    }

    #[test]
    fn constant_function_has_zero_gradient() {
        struct Constant;
        impl Differentiable for Constant {
            fn eval<S: Scalar>(&self, _x: &[S]) -> S {
                S::from_f64(4.0)
            }
        }
        let (value, grad) = value_and_gradient(&Constant, &[1.0, 2.0]);
        assert_eq!(value, 4.0);
        assert_eq!(grad, vec![0.0, 0.0]);
    }
}
