//! Common types and utilities shared across the nowcast interpolation crates.

pub mod error;
pub mod grid;
pub mod time;

pub use error::{NowcastError, NowcastResult};
pub use grid::GridSpec;
pub use time::{NowcastClock, TimeParseError};
