//! Mathematical utilities: least squares, descriptive statistics, hyperlog transform.

pub mod hlog;
pub mod ols;
pub mod stats;

pub use hlog::*;
pub use ols::*;
pub use stats::*;
