//! Event data: per-well tables, titration layouts, synthetic wells.

pub mod events;
pub mod sample;
pub mod titration;

pub use events::*;
pub use sample::*;
pub use titration::*;
