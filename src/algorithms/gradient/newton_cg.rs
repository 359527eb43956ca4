use std::ops::ControlFlow;

use crate::{
    algorithms::{
        gradient::{summarize_status, GradientStatus},
        line_search::BacktrackingLineSearch,
    },
    core::{Callbacks, MinimizationSummary},
    traits::{Algorithm, Gradient, LineSearch, Terminator},
    DVector, Float,
};

/// A [`Terminator`] for [`NewtonCG`] which breaks once the gradient norm falls below `eps_abs`
/// (converged) or the line search could not find a decrease (stalled).
#[derive(Clone)]
pub struct NewtonCGGTerminator {
    /// Absolute tolerance on $`\|\nabla f\|_2`$ (default = `cbrt(eps)`).
    pub eps_abs: Float,
}
impl Default for NewtonCGGTerminator {
    fn default() -> Self {
        Self {
            eps_abs: Float::EPSILON.cbrt(),
        }
    }
}
impl<P, U, E> Terminator<NewtonCG<U, E>, P, GradientStatus, U, E> for NewtonCGGTerminator
where
    P: Gradient<U, E>,
{
    fn check_for_termination(
        &mut self,
        _current_step: usize,
        algorithm: &mut NewtonCG<U, E>,
        _problem: &P,
        status: &mut GradientStatus,
        _args: &U,
    ) -> ControlFlow<()> {
        if algorithm.g.norm() < self.eps_abs {
            status.set_converged();
            status.with_message("GRADIENT CONVERGED");
            return ControlFlow::Break(());
        }
        if algorithm.stalled {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// The internal configuration struct for the [`NewtonCG`] algorithm.
#[derive(Clone)]
pub struct NewtonCGConfig<U, E> {
    x0: DVector<Float>,
    line_search: Box<dyn LineSearch<GradientStatus, U, E>>,
    max_cg_iters: Option<usize>,
}
impl<U, E> Default for NewtonCGConfig<U, E> {
    fn default() -> Self {
        Self {
            x0: DVector::zeros(0),
            line_search: Box::<BacktrackingLineSearch>::default(),
            max_cg_iters: None,
        }
    }
}
impl<U, E> NewtonCGConfig<U, E> {
    /// Set the starting position of the algorithm.
    pub fn with_x0<I: IntoIterator<Item = Float>>(mut self, x0: I) -> Self {
        self.x0 = DVector::from_vec(x0.into_iter().collect());
        self
    }
    /// Set the line search used along each Newton direction (default =
    /// [`BacktrackingLineSearch`]).
    pub fn with_line_search<LS: LineSearch<GradientStatus, U, E> + 'static>(
        mut self,
        line_search: LS,
    ) -> Self {
        self.line_search = Box::new(line_search);
        self
    }
    /// Set the maximum number of inner conjugate-gradient iterations per step (default = the
    /// problem dimension).
    pub const fn with_max_cg_iters(mut self, max_cg_iters: usize) -> Self {
        self.max_cg_iters = Some(max_cg_iters);
        self
    }
}

/// The truncated Newton (Newton-CG) algorithm.
///
/// Each step approximately solves $`H\vec{p} = -\nabla f`$ by conjugate gradients using only
/// Hessian-vector products, then chooses a step length along $`\vec{p}`$ with a line search. This
/// is Algorithm 7.1 from Nocedal and Wright's book "Numerical Optimization"[^1]:
///
/// 1. Set the forcing tolerance $`\epsilon = \min(0.5, \sqrt{\|\nabla f\|})\|\nabla f\|`$.
/// 2. Run CG from $`\vec{z} = 0`$ until the residual falls below $`\epsilon`$ or a direction of
///    non-positive curvature appears. In the latter case use the current iterate, or
///    $`-\nabla f`$ if there is none yet.
/// 3. Line search along the resulting descent direction.
///
/// [^1]: [Numerical Optimization. Springer New York, 2006. doi: 10.1007/978-0-387-40065-5.](https://doi.org/10.1007/978-0-387-40065-5)
#[derive(Clone)]
pub struct NewtonCG<U, E> {
    config: NewtonCGConfig<U, E>,
    x: DVector<Float>,
    f: Float,
    g: DVector<Float>,
    stalled: bool,
}
impl<U, E> Default for NewtonCG<U, E> {
    fn default() -> Self {
        Self {
            config: NewtonCGConfig::default(),
            x: DVector::zeros(0),
            f: Float::INFINITY,
            g: DVector::zeros(0),
            stalled: false,
        }
    }
}

impl<U, E> NewtonCG<U, E> {
    fn cg_direction<P: Gradient<U, E>>(
        &self,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<DVector<Float>, E> {
        let n = self.x.len();
        let g_norm = self.g.norm();
        let tolerance = Float::min(0.5, g_norm.sqrt()) * g_norm;
        let max_iters = self.config.max_cg_iters.unwrap_or(n).max(1);
        let mut z = DVector::zeros(n);
        let mut r = self.g.clone();
        let mut d = -&r;
        for j in 0..max_iters {
            let bd = problem.hessian_vector_product(&self.x, &d, args)?;
            status.count_hvp();
            let curvature = d.dot(&bd);
            if curvature.is_nan() || curvature <= 0.0 {
                return Ok(if j == 0 { -&self.g } else { z });
            }
            let r_dot_r = r.dot(&r);
            let alpha = r_dot_r / curvature;
            z += d.scale(alpha);
            let r_next = &r + bd.scale(alpha);
            if r_next.norm() < tolerance {
                return Ok(z);
            }
            let beta = r_next.dot(&r_next) / r_dot_r;
            d = -&r_next + d.scale(beta);
            r = r_next;
        }
        Ok(z)
    }
}

impl<P, U, E> Algorithm<P, GradientStatus, U, E> for NewtonCG<U, E>
where
    P: Gradient<U, E>,
{
    type Summary = MinimizationSummary;
    type Config = NewtonCGConfig<U, E>;

    fn initialize(
        &mut self,
        config: Self::Config,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        self.config = config;
        self.x = self.config.x0.clone();
        self.f = problem.evaluate(&self.x, args)?;
        status.count_cost();
        self.g = problem.gradient(&self.x, args)?;
        status.count_gradient();
        self.stalled = false;
        status.move_to(self.x.clone(), self.f);
        Ok(())
    }

    fn step(
        &mut self,
        _current_step: usize,
        problem: &P,
        status: &mut GradientStatus,
        args: &U,
    ) -> Result<(), E> {
        let p = self.cg_direction(problem, status, args)?;
        match self
            .config
            .line_search
            .search(&self.x, self.f, &self.g, &p, problem, args, status)?
        {
            Ok(output) => {
                self.x += p.scale(output.alpha);
                self.f = output.fx;
                self.g = output.g;
                status.move_to(self.x.clone(), self.f);
                status.with_message("NEWTON STEP");
            }
            Err(_) => {
                self.stalled = true;
                status.with_message("LINE SEARCH FAILED");
            }
        }
        Ok(())
    }

    fn summarize(
        &self,
        current_step: usize,
        _problem: &P,
        status: &GradientStatus,
        _args: &U,
    ) -> Result<Self::Summary, E> {
        Ok(summarize_status(&self.config.x0, current_step, status))
    }

    fn reset(&mut self) {
        self.stalled = false;
    }

    fn default_callbacks() -> Callbacks<Self, P, GradientStatus, U, E>
    where
        Self: Sized,
    {
        Callbacks::empty().with_terminator(NewtonCGGTerminator::default())
    }
}
