//! Binding-curve fitting.
//!
//! Responsibilities:
//!
//! - generate the log-spaced kd grid
//! - evaluate each kd candidate (parallel) with a linear solve for `(init, sat)`
//! - refine the best start by bounded Levenberg–Marquardt and report statistics

pub mod fitter;
pub mod kd_grid;
pub mod levmar;

pub use fitter::*;
pub use kd_grid::*;
