//! [`Scalar`] trait: abstraction over `f64`, [`Dual`] and [`Var`](crate::ad::Var) so the mixture
//! likelihood is written once and reused for plain evaluation, gradients, and Hessian-vector
//! products.

use std::{
    fmt::Debug,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
};

use crate::ad::{special, Dual};

/// A scalar type the likelihood can be computed in.
///
/// Comparisons only look at the primal value, so branching on a comparison (row maxima, pivot
/// selection) is treated as locally constant by every differentiating implementation.
pub trait Scalar:
    Copy
    + Debug
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Sum
    + 'static
{
    /// Wrap an `f64` constant (zero derivative for AD types).
    fn from_f64(v: f64) -> Self;

    /// Extract the primal value.
    fn value(&self) -> f64;

    /// Natural logarithm.
    fn ln(self) -> Self;

    /// Exponential.
    fn exp(self) -> Self;

    /// Square root.
    fn sqrt(self) -> Self;

    /// Integer power.
    fn powi(self, n: i32) -> Self;

    /// $`\ln\Gamma(x)`$
    fn ln_gamma(self) -> Self;

    /// The polygamma function of the given order ($`\psi^{(0)}`$ is the digamma function).
    fn polygamma(self, order: u32) -> Self;

    /// Additive identity.
    #[inline]
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// Multiplicative identity.
    #[inline]
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Multiply by an `f64` constant.
    #[inline]
    fn scale(self, c: f64) -> Self {
        self * Self::from_f64(c)
    }

    /// `true` if the primal value is finite.
    #[inline]
    fn is_finite(&self) -> bool {
        self.value().is_finite()
    }
}

impl Scalar for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    #[inline]
    fn ln_gamma(self) -> Self {
        special::ln_gamma(self)
    }

    #[inline]
    fn polygamma(self, order: u32) -> Self {
        special::polygamma(order, self)
    }
}

impl Scalar for Dual {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.val
    }

    #[inline]
    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.dot / self.val)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, self.dot * e)
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.dot / (2.0 * s))
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(1.0);
        }
        Self::new(
            self.val.powi(n),
            self.dot * f64::from(n) * self.val.powi(n - 1),
        )
    }

    #[inline]
    fn ln_gamma(self) -> Self {
        Self::new(
            special::ln_gamma(self.val),
            self.dot * special::polygamma(0, self.val),
        )
    }

    #[inline]
    fn polygamma(self, order: u32) -> Self {
        Self::new(
            special::polygamma(order, self.val),
            self.dot * special::polygamma(order + 1, self.val),
        )
    }
}
