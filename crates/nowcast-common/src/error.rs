//! Error types for nowcast input/output collaborators.

use thiserror::Error;

/// Result type alias using NowcastError.
pub type NowcastResult<T> = Result<T, NowcastError>;

/// Primary error type for reading archives and rasters and writing outputs.
#[derive(Debug, Error)]
pub enum NowcastError {
    // === Input Errors ===
    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Grid shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    // === Output Errors ===
    #[error("Failed to write output: {0}")]
    WriteError(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NowcastError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly category used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            NowcastError::MissingData(_)
            | NowcastError::InvalidParameter { .. }
            | NowcastError::InvalidFormat(_)
            | NowcastError::ShapeMismatch { .. } => "input",
            NowcastError::DataReadError(_) | NowcastError::ArchiveError(_) => "archive",
            NowcastError::WriteError(_) => "output",
            NowcastError::Io(_) => "io",
        }
    }
}
