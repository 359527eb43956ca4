use crate::Float;
use fastrand::Rng;
use fastrand_contrib::RngExt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    OnceLock,
};

/// Weighted sampling of an index, as used by k-means++ seeding.
pub trait RandChoice {
    /// Draw an index with probability proportional to its weight.
    ///
    /// Returns `None` if the weights do not have a positive, finite total. Indices with zero
    /// weight are never drawn.
    fn choice_weighted(&mut self, weights: &[Float]) -> Option<usize>;
}

impl RandChoice for Rng {
    fn choice_weighted(&mut self, weights: &[Float]) -> Option<usize> {
        let total: Float = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }
        let u = self.range(0.0, total);
        let mut cumulative = 0.0;
        for (index, &weight) in weights.iter().enumerate() {
            cumulative += weight;
            if weight > 0.0 && u < cumulative {
                return Some(index);
            }
        }
        // rounding can leave u just past the last partial sum
        weights.iter().rposition(|&w| w > 0.0)
    }
}

/// Floating-point draws on top of [`fastrand`].
pub trait SampleFloat {
    /// A uniform value in `[lower, upper)`.
    fn range(&mut self, lower: Float, upper: Float) -> Float;
    /// A normal value with mean `mu` and standard deviation `sigma`.
    fn normal(&mut self, mu: Float, sigma: Float) -> Float;
}

impl SampleFloat for Rng {
    fn range(&mut self, lower: Float, upper: Float) -> Float {
        self.f64_range(lower..upper)
    }
    fn normal(&mut self, mu: Float, sigma: Float) -> Float {
        self.f64_normal(mu, sigma)
    }
}

static WARNINGS_ENABLED: AtomicBool = AtomicBool::new(true);
static WARNINGS_FROM_ENV: OnceLock<Option<bool>> = OnceLock::new();

fn env_setting() -> Option<bool> {
    *WARNINGS_FROM_ENV.get_or_init(|| match std::env::var("MIXGRAD_WARNINGS").as_deref() {
        Ok("0") => Some(false),
        Ok("1") => Some(true),
        _ => None,
    })
}

/// Turn on warnings from fits and initializations. `MIXGRAD_WARNINGS=0` still wins.
pub fn enable_warnings() {
    WARNINGS_ENABLED.store(true, Ordering::Relaxed);
}

/// Silence warnings from fits and initializations. `MIXGRAD_WARNINGS=1` still wins.
pub fn disable_warnings() {
    WARNINGS_ENABLED.store(false, Ordering::Relaxed);
}

/// Whether [`maybe_warn`] currently logs.
///
/// The environment variable `MIXGRAD_WARNINGS` (`0` or `1`) takes precedence over
/// [`enable_warnings`] and [`disable_warnings`]. Warnings are on by default.
pub fn should_warn() -> bool {
    env_setting().unwrap_or_else(|| WARNINGS_ENABLED.load(Ordering::Relaxed))
}

/// Emit `msg` at the `warn` level unless warnings are off.
pub fn maybe_warn(msg: &str) {
    if should_warn() {
        log::warn!("{msg}");
    }
}
