//! Motion-Compensated Accumulation Engine for Ensemble Nowcasts
//!
//! This crate turns coarse-step ensemble precipitation nowcasts into finely
//! time-resolved rainfall accumulations. Intensity fields arrive once per
//! nowcast step; between two fields the rain is advected along the motion
//! field and accumulated substep by substep.
//!
//! - **Lookup tables only in the hot loop**: intensities travel as integer
//!   codes and every substep reduces to one table lookup per pixel
//! - **Shared immutable tables**: trajectory tables are built once per motion
//!   field and shared across members through `Arc`
//! - **Two fixed phases**: a parallel table build, then a parallel sweep per
//!   step with a join barrier before aggregation and buffer swapping
//!
//! # Architecture
//!
//! ```text
//! InterpContext::build(config, grid, motion)   (pool of one thread per motion field)
//!      │
//!      ├─► CodeTables          (code → accumulation, rate → dBZ index)
//!      ├─► AccumulationLut     ([past][future][substep] accumulation)
//!      └─► TrajectoryTables    (one rayon task per motion field)
//!               │
//!               ▼
//! NowcastRunner::run(source, sink)
//!      │
//!      └─► for each step
//!               ├─► FieldSource::read_member_step (every member)
//!               ├─► MemberState::interpolate      (par_iter_mut, joined)
//!               ├─► OutputSink::write_*           (accumulations, rasters)
//!               ├─► EnsembleAggregator::aggregate (optional)
//!               └─► MemberState::advance          (swap past/future)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use interp_core::{InterpConfig, InterpContext, NowcastRunner};
//!
//! let ctx = InterpContext::build(config, grid, motion_fields)?;
//! let mut runner = NowcastRunner::new(&ctx, observation_codes)?;
//! runner.run(&mut archive, &mut file_sink)?;
//! ```

pub mod acc_lut;
pub mod codes;
pub mod config;
pub mod context;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod io;
pub mod runner;
pub mod trajectory;

// Re-export commonly used types at crate root
pub use acc_lut::AccumulationLut;
pub use codes::{Accum, Code, CodeTables, ObservationScale};
pub use config::{AccumulationMode, Calibration, DiagnosticsConfig, InterpConfig};
pub use context::InterpContext;
pub use engine::{MemberState, StepSummary};
pub use ensemble::{DetermWeightSchedule, EnsembleAggregator, EnsembleMean};
pub use error::{InterpError, Result};
pub use io::{FieldSource, OutputSink};
pub use runner::{NowcastRunner, RunSummary};
pub use trajectory::{Direction, MotionField, SourceIndex, TrajectoryTables};
