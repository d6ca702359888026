//! Nowcast interpolation service.
//!
//! Reads an HDF5 ensemble nowcast archive and the observation at analysis
//! time, runs the motion-compensated interpolation for every member and
//! writes per-step accumulation files plus optional diagnostics.

pub mod config;
pub mod run;

pub use config::Args;
pub use run::{failure_category, run};
