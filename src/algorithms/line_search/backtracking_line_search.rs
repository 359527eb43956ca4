use crate::{
    algorithms::gradient::GradientStatus,
    traits::{Gradient, LineSearch, LineSearchOutput},
    DVector, Float,
};

/// A minimal line search algorithm which satisfies the Armijo condition. This is equivalent to
/// Algorithm 3.1 from Nocedal and Wright's book "Numerical Optimization"[^1] (page 37), with a
/// cap on the number of contractions.
///
/// Trial points where the objective is not finite always fail the Armijo test, so the step keeps
/// shrinking away from them.
///
/// [^1]: [Numerical Optimization. Springer New York, 2006. doi: 10.1007/978-0-387-40065-5.](https://doi.org/10.1007/978-0-387-40065-5)
#[derive(Clone)]
pub struct BacktrackingLineSearch {
    rho: Float,
    c: Float,
    max_iters: usize,
}
impl Default for BacktrackingLineSearch {
    fn default() -> Self {
        Self {
            rho: 0.5,
            c: 1e-4,
            max_iters: 50,
        }
    }
}
impl BacktrackingLineSearch {
    /// Set the contraction factor $`\rho \in (0, 1)`$ (default = `0.5`).
    ///
    /// # Panics
    ///
    /// Panics if `rho` is not in `(0, 1)`.
    pub fn with_rho(mut self, rho: Float) -> Self {
        assert!(0.0 < rho && rho < 1.0);
        self.rho = rho;
        self
    }
    /// Set the sufficient-decrease constant $`c \in (0, 1)`$ (default = `1e-4`).
    ///
    /// # Panics
    ///
    /// Panics if `c` is not in `(0, 1)`.
    pub fn with_c(mut self, c: Float) -> Self {
        assert!(0.0 < c && c < 1.0);
        self.c = c;
        self
    }
    /// Set the maximum number of contractions before giving up (default = `50`).
    pub const fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }
}

impl<U, E> LineSearch<GradientStatus, U, E> for BacktrackingLineSearch {
    fn search(
        &mut self,
        x: &DVector<Float>,
        fx: Float,
        g: &DVector<Float>,
        p: &DVector<Float>,
        problem: &dyn Gradient<U, E>,
        args: &U,
        status: &mut GradientStatus,
    ) -> Result<Result<LineSearchOutput, LineSearchOutput>, E> {
        let dphi_0 = g.dot(p);
        let mut alpha_i = 1.0;
        for _ in 0..=self.max_iters {
            let x_i = x + p.scale(alpha_i);
            let phi_alpha_i = problem.evaluate(&x_i, args)?;
            status.count_cost();
            if phi_alpha_i <= (self.c * alpha_i).mul_add(dphi_0, fx) {
                let g_alpha_i = problem.gradient(&x_i, args)?;
                status.count_gradient();
                return Ok(Ok(LineSearchOutput {
                    alpha: alpha_i,
                    fx: phi_alpha_i,
                    g: g_alpha_i,
                }));
            }
            alpha_i *= self.rho;
        }
        Ok(Err(LineSearchOutput {
            alpha: 0.0,
            fx,
            g: g.clone(),
        }))
    }
}
