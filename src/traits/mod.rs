/// Module containing the [`Algorithm`] trait.
pub mod algorithm;
/// Module containing the [`Terminator`] and [`Observer`] traits.
pub mod callback;
/// Module containing the [`CostFunction`] and [`Gradient`] traits.
pub mod cost_function;
/// Module containing the [`LineSearch`] trait.
pub mod linesearch;
/// Module containing the [`Status`] trait.
pub mod status;

pub use algorithm::Algorithm;
pub use callback::{Observer, Terminator};
pub use cost_function::{CostFunction, Gradient};
pub use linesearch::{LineSearch, LineSearchOutput};
pub use status::Status;
