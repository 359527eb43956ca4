/// Implementation of the backtracking line search algorithm.
pub mod backtracking_line_search;
pub use backtracking_line_search::BacktrackingLineSearch;
