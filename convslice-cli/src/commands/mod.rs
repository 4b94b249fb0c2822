//! Command implementations for the convslice CLI

pub mod extract;
pub mod split;

pub use extract::run_extract;
pub use split::{run_markers, run_ranges};
