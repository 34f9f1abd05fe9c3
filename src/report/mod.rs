//! Reporting utilities: formatted terminal tables.

pub mod format;

pub use format::*;
