//! Binding isotherm model.
//!
//! Implemented as small, pure functions so that fitting/search code can stay
//! generic over how the curve is evaluated.

pub mod model;

pub use model::*;
