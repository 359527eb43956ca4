//! Tape-based reverse-mode automatic differentiation.
//!
//! Every operation on a [`Var`] records one node (at most two parents and the local partial
//! derivative with respect to each) on a thread-local [`Tape`]. A single backward sweep then
//! yields the full gradient. The tape is generic over its element type: with `f64` elements the
//! sweep produces a gradient, and with [`Dual`] elements it runs forward-over-reverse, so the
//! tangent part of every adjoint is a Hessian-vector product.

use std::{
    cell::RefCell,
    cmp::Ordering,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
};

use crate::ad::{Dual, Scalar};

const NO_PARENT: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Node<T> {
    parents: [usize; 2],
    partials: [T; 2],
}

/// A linear record of the operations performed on [`Var`]s of one element type.
#[derive(Debug)]
pub struct Tape<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for Tape<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T: Scalar> Tape<T> {
    /// Remove all recorded nodes, keeping the allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, parents: [usize; 2], partials: [T; 2]) -> usize {
        self.nodes.push(Node { parents, partials });
        self.nodes.len() - 1
    }

    /// Propagate adjoints backwards from `output`, returning the adjoint of every node.
    pub fn backward(&self, output: usize) -> Vec<T> {
        let mut adjoints = vec![T::zero(); self.nodes.len()];
        if output >= self.nodes.len() {
            return adjoints;
        }
        adjoints[output] = T::one();
        for i in (0..=output).rev() {
            let adjoint = adjoints[i];
            let node = &self.nodes[i];
            for (&parent, &partial) in node.parents.iter().zip(&node.partials) {
                if parent != NO_PARENT {
                    adjoints[parent] = adjoints[parent] + partial * adjoint;
                }
            }
        }
        adjoints
    }
}

/// Element types that own a thread-local [`Tape`].
pub trait TapeScalar: Scalar {
    /// Run `f` with exclusive access to this thread's tape for `Self`.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from inside `f`.
    fn with_tape<R>(f: impl FnOnce(&mut Tape<Self>) -> R) -> R;
}

thread_local! {
    static F64_TAPE: RefCell<Tape<f64>> = RefCell::new(Tape::default());
    static DUAL_TAPE: RefCell<Tape<Dual>> = RefCell::new(Tape::default());
}

impl TapeScalar for f64 {
    fn with_tape<R>(f: impl FnOnce(&mut Tape<Self>) -> R) -> R {
        F64_TAPE.with(|tape| f(&mut tape.borrow_mut()))
    }
}

impl TapeScalar for Dual {
    fn with_tape<R>(f: impl FnOnce(&mut Tape<Self>) -> R) -> R {
        DUAL_TAPE.with(|tape| f(&mut tape.borrow_mut()))
    }
}

/// A value recorded on the thread-local tape of its element type.
///
/// Constants are never recorded; operations whose inputs are all constants stay constant.
#[derive(Debug, Clone, Copy)]
pub struct Var<T = f64> {
    val: T,
    idx: usize,
}

impl<T: TapeScalar> Var<T> {
    /// A constant: gradients never flow through it.
    #[inline]
    pub const fn constant(val: T) -> Self {
        Self {
            val,
            idx: NO_PARENT,
        }
    }

    /// Record an independent input on the tape.
    pub fn input(val: T) -> Self {
        let idx = T::with_tape(|tape| tape.push([NO_PARENT; 2], [T::zero(); 2]));
        Self { val, idx }
    }

    /// The primal value.
    #[inline]
    pub const fn val(&self) -> T {
        self.val
    }

    /// Position on the tape, [`None`] for constants.
    pub const fn index(&self) -> Option<usize> {
        if self.idx == NO_PARENT {
            None
        } else {
            Some(self.idx)
        }
    }

    #[inline]
    fn unary(self, val: T, partial: T) -> Self {
        if self.idx == NO_PARENT {
            return Self::constant(val);
        }
        let idx = T::with_tape(|tape| tape.push([self.idx, NO_PARENT], [partial, T::zero()]));
        Self { val, idx }
    }

    #[inline]
    fn binary(self, rhs: Self, val: T, d_lhs: T, d_rhs: T) -> Self {
        if self.idx == NO_PARENT && rhs.idx == NO_PARENT {
            return Self::constant(val);
        }
        let idx = T::with_tape(|tape| tape.push([self.idx, rhs.idx], [d_lhs, d_rhs]));
        Self { val, idx }
    }
}

impl<T: TapeScalar> PartialEq for Var<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val.value() == other.val.value()
    }
}

impl<T: TapeScalar> PartialOrd for Var<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.value().partial_cmp(&other.val.value())
    }
}

impl<T: TapeScalar> Add for Var<T> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, self.val + rhs.val, T::one(), T::one())
    }
}

impl<T: TapeScalar> Sub for Var<T> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, self.val - rhs.val, T::one(), -T::one())
    }
}

impl<T: TapeScalar> Mul for Var<T> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, self.val * rhs.val, rhs.val, self.val)
    }
}

impl<T: TapeScalar> Div for Var<T> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let val = self.val / rhs.val;
        self.binary(rhs, val, T::one() / rhs.val, -val / rhs.val)
    }
}

impl<T: TapeScalar> Neg for Var<T> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.unary(-self.val, -T::one())
    }
}

impl<T: TapeScalar> Sum for Var<T> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::constant(T::zero()), |acc, x| acc + x)
    }
}

impl<T: TapeScalar> Scalar for Var<T> {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::constant(T::from_f64(v))
    }

    #[inline]
    fn value(&self) -> f64 {
        self.val.value()
    }

    #[inline]
    fn ln(self) -> Self {
        self.unary(self.val.ln(), T::one() / self.val)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.val.exp();
        self.unary(e, e)
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.unary(s, T::from_f64(0.5) / s)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(T::one());
        }
        self.unary(
            self.val.powi(n),
            T::from_f64(f64::from(n)) * self.val.powi(n - 1),
        )
    }

    #[inline]
    fn ln_gamma(self) -> Self {
        self.unary(self.val.ln_gamma(), self.val.polygamma(0))
    }

    #[inline]
    fn polygamma(self, order: u32) -> Self {
        self.unary(self.val.polygamma(order), self.val.polygamma(order + 1))
    }
}
