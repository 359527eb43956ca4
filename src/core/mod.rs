/// [`Callbacks`] and the generic [`MaxSteps`] and [`DebugObserver`] callbacks.
pub mod callbacks;
/// [`MinimizationSummary`] type for the result of the minimization.
pub mod summary;
/// Random sampling helpers and warning controls.
pub mod utils;

pub use callbacks::{Callbacks, DebugObserver, MaxSteps};
pub use summary::{Evaluations, MinimizationSummary};
pub use utils::{RandChoice, SampleFloat};
