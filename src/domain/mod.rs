//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - titration layout and manifest types (`TitrationStop`, `ExperimentManifest`)
//! - per-well reduction outputs (`WellSummary`)
//! - fit outputs (`BindingFit`, `TitrationRecord`, `FitFile`)

pub mod types;

pub use types::*;
