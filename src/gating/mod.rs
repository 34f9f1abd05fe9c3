//! Event gating: threshold and polygon gates applied in sequence.

pub mod gate;
pub mod pipeline;
pub mod polygon;

pub use gate::*;
pub use pipeline::*;
pub use polygon::*;
