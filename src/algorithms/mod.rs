/// Gradient-based minimizers.
pub mod gradient;

/// Module containing various line-search methods.
pub mod line_search;
