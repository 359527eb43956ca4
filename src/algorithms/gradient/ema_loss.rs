use std::ops::ControlFlow;

use crate::{
    algorithms::gradient::GradientStatus,
    traits::{Algorithm, Terminator},
    Float,
};

/// A [`Terminator`] which tracks an exponential moving average (EMA) of the loss and breaks once
/// it has changed by less than `eps_loss` for `patience` consecutive steps.
///
/// This is the convergence criterion of the first-order methods ([`GradientDescent`],
/// [`RMSProp`], [`Adam`]), which take fixed-size steps and so never drive the gradient to zero
/// exactly.
///
/// [`GradientDescent`]: crate::algorithms::gradient::GradientDescent
/// [`RMSProp`]: crate::algorithms::gradient::RMSProp
/// [`Adam`]: crate::algorithms::gradient::Adam
#[derive(Clone)]
pub struct EmaLossTerminator {
    beta_c: Float,
    eps_loss: Float,
    patience: usize,
    ema_loss: Option<Float>,
    counter: usize,
}
impl Default for EmaLossTerminator {
    fn default() -> Self {
        Self {
            beta_c: 0.9,
            eps_loss: Float::EPSILON.sqrt(),
            patience: 10,
            ema_loss: None,
            counter: 0,
        }
    }
}
impl EmaLossTerminator {
    /// Set the decay of the moving average (default = `0.9`).
    pub const fn with_beta_c(mut self, value: Float) -> Self {
        self.beta_c = value;
        self
    }
    /// Set the smallest change in the moving average that counts as progress (default =
    /// `sqrt(eps)`).
    pub const fn with_eps_loss(mut self, value: Float) -> Self {
        self.eps_loss = value;
        self
    }
    /// Set the number of steps without progress allowed before terminating (default = `10`).
    pub const fn with_patience(mut self, value: usize) -> Self {
        self.patience = value;
        self
    }
}
impl<A, P, U, E> Terminator<A, P, GradientStatus, U, E> for EmaLossTerminator
where
    A: Algorithm<P, GradientStatus, U, E>,
{
    fn check_for_termination(
        &mut self,
        _current_step: usize,
        _algorithm: &mut A,
        _problem: &P,
        status: &mut GradientStatus,
        _args: &U,
    ) -> ControlFlow<()> {
        let Some(prev_ema_loss) = self.ema_loss else {
            self.ema_loss = Some(status.fx);
            return ControlFlow::Continue(());
        };
        let ema_loss = self
            .beta_c
            .mul_add(prev_ema_loss, (1.0 - self.beta_c) * status.fx);
        self.ema_loss = Some(ema_loss);
        if (ema_loss - prev_ema_loss).abs() < self.eps_loss {
            self.counter += 1;
        } else {
            self.counter = 0;
        }
        if self.counter >= self.patience {
            status.set_converged();
            status.with_message(&format!(
                "EMA LOSS HAS NOT IMPROVED IN {} STEPS",
                self.counter
            ));
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}
