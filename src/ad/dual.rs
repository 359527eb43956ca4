//! Forward-mode automatic differentiation via dual numbers.

use std::{
    cmp::Ordering,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
};

/// A dual number $`a + b\varepsilon`$ with $`\varepsilon^2 = 0`$.
///
/// `val` holds the primal value, `dot` the directional derivative. Equality and ordering only
/// consider `val`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dual {
    /// Primal value.
    pub val: f64,
    /// Tangent value.
    pub dot: f64,
}

impl Dual {
    /// Create a dual with an explicit tangent.
    #[inline]
    pub const fn new(val: f64, dot: f64) -> Self {
        Self { val, dot }
    }

    /// Create a constant (tangent = 0).
    #[inline]
    pub const fn constant(val: f64) -> Self {
        Self { val, dot: 0.0 }
    }

    /// Create an independent variable (tangent = 1).
    #[inline]
    pub const fn var(val: f64) -> Self {
        Self { val, dot: 1.0 }
    }
}

impl PartialEq for Dual {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl PartialOrd for Dual {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

impl Add for Dual {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.dot + rhs.dot)
    }
}

impl Sub for Dual {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.dot - rhs.dot)
    }
}

impl Mul for Dual {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.val * rhs.val,
            self.dot.mul_add(rhs.val, self.val * rhs.dot),
        )
    }
}

impl Div for Dual {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let val = self.val / rhs.val;
        Self::new(val, (self.dot - val * rhs.dot) / rhs.val)
    }
}

impl Neg for Dual {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.val, -self.dot)
    }
}

impl Sum for Dual {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::constant(0.0), |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn product_and_quotient_rules() {
        let x = Dual::var(3.0);
        let c = Dual::constant(2.0);
        let y = x * x * c; // 2x^2
        assert_relative_eq!(y.val, 18.0);
        assert_relative_eq!(y.dot, 12.0);
        let z = c / x; // 2/x
        assert_relative_eq!(z.val, 2.0 / 3.0, epsilon = 1e-15);
        assert_relative_eq!(z.dot, -2.0 / 9.0, epsilon = 1e-15);
    }

    #[test]
    fn ordering_ignores_tangent() {
        assert!(Dual::new(1.0, 5.0) < Dual::new(2.0, -5.0));
        assert_eq!(Dual::new(1.0, 0.0), Dual::new(1.0, 3.0));
        let total: Dual = [Dual::var(1.0), Dual::new(2.0, 0.5)].into_iter().sum();
        assert_relative_eq!(total.dot, 1.5);
    }
}
