//! Error types for the interpolation engine.

use nowcast_common::NowcastError;
use thiserror::Error;

/// Errors that can occur while building tables or running the nowcast loop.
#[derive(Error, Debug)]
pub enum InterpError {
    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// A buffer does not match the grid it is used with.
    #[error("{what}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Number of motion fields is neither one nor one per member.
    #[error("expected 1 or {members} motion fields, got {actual}")]
    MotionFieldCount { members: usize, actual: usize },

    /// Member index outside the configured ensemble.
    #[error("member {member} out of range (ensemble has {members} members)")]
    MemberOutOfRange { member: usize, members: usize },

    /// Worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Reading inputs or writing outputs failed.
    #[error(transparent)]
    Collaborator(#[from] NowcastError),
}

impl InterpError {
    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for InterpError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(err.to_string())
    }
}

/// Result type for interpolation operations.
pub type Result<T> = std::result::Result<T, InterpError>;
