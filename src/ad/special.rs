//! Gamma-family special functions on `f64`.

/// Even Bernoulli numbers $`B_2, B_4, \dots, B_{12}`$ used by the asymptotic polygamma series.
const BERNOULLI_EVEN: [f64; 6] = [
    1.0 / 6.0,
    -1.0 / 30.0,
    1.0 / 42.0,
    -1.0 / 30.0,
    5.0 / 66.0,
    -691.0 / 2730.0,
];

/// Below this argument the recurrence $`\psi^{(n)}(x) = \psi^{(n)}(x+1) - (-1)^n n!/x^{n+1}`$
/// is applied before switching to the asymptotic series.
const ASYMPTOTIC_THRESHOLD: f64 = 12.0;

/// $`\ln\Gamma(x)`$
pub fn ln_gamma(x: f64) -> f64 {
    spec_math::Gamma::lgamma(&x)
}

/// The polygamma function $`\psi^{(n)}(x)`$, where `order = 0` is the digamma function.
///
/// Orders above zero are only defined here for `x > 0` and return `NaN` otherwise.
pub fn polygamma(order: u32, x: f64) -> f64 {
    if order == 0 {
        return spec_math::Gamma::digamma(&x);
    }
    if x == f64::INFINITY {
        return 0.0;
    }
    if x.is_nan() || x <= 0.0 {
        return f64::NAN;
    }
    let n = order as i32;
    let n_factorial: f64 = (1..=order).map(f64::from).product();
    let sign = if order % 2 == 1 { 1.0 } else { -1.0 };

    let mut x = x;
    let mut shifted = 0.0;
    while x < ASYMPTOTIC_THRESHOLD {
        shifted += x.powi(-(n + 1));
        x += 1.0;
    }

    let mut series = n_factorial / (f64::from(order) * x.powi(n)) + n_factorial / (2.0 * x.powi(n + 1));
    for (k, b) in BERNOULLI_EVEN.iter().enumerate() {
        let two_k = 2 * (k as i32 + 1);
        // (2k + n - 1)! / (2k)!
        let ratio: f64 = ((two_k + 1)..(two_k + n)).map(f64::from).product();
        series += b * ratio / x.powi(two_k + n);
    }
    sign * (n_factorial * shifted + series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn trigamma_known_values() {
        assert_relative_eq!(polygamma(1, 1.0), PI * PI / 6.0, epsilon = 1e-12);
        assert_relative_eq!(polygamma(1, 0.5), PI * PI / 2.0, epsilon = 1e-12);
        // asymptotic regime
        assert_relative_eq!(
            polygamma(1, 50.0),
            0.020201333226697125,
            max_relative = 1e-12
        );
    }

    #[test]
    fn tetragamma_known_value() {
        // psi''(1) = -2 zeta(3)
        assert_relative_eq!(polygamma(2, 1.0), -2.404_113_806_319_188_5, epsilon = 1e-11);
    }

    #[test]
    fn digamma_matches_recurrence() {
        let x = 3.7;
        assert_relative_eq!(
            polygamma(0, x + 1.0) - polygamma(0, x),
            1.0 / x,
            epsilon = 1e-10
        );
        assert_relative_eq!(ln_gamma(5.0), 24.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn trigamma_is_derivative_of_digamma() {
        let x = 2.3;
        let h = 1e-5;
        let fd = (polygamma(0, x + h) - polygamma(0, x - h)) / (2.0 * h);
        assert_relative_eq!(polygamma(1, x), fd, epsilon = 1e-8);
    }

    #[test]
    fn invalid_arguments_are_nan() {
        assert!(polygamma(1, -1.0).is_nan());
        assert!(polygamma(1, f64::NAN).is_nan());
    }
}
