//! Error types for meetingorder.
//!
//! Library crates use [`MeetingOrderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all meetingorder operations.
#[derive(Debug, thiserror::Error)]
pub enum MeetingOrderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure talking to the oracle or a live calendar page
    /// (connection error, timeout, non-2xx status).
    #[error("network error: {0}")]
    Network(String),

    /// The oracle answered 2xx but the envelope did not have the expected shape.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Text or markup parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required input file does not exist.
    #[error("input not found: {}", path.display())]
    InputMissing { path: PathBuf },

    /// A payload could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Work-order or export CSV error.
    #[error("csv error: {0}")]
    Csv(String),

    /// Meeting capture (screenshot or calendar page) error.
    #[error("capture error: {0}")]
    Capture(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MeetingOrderError>;

impl MeetingOrderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Report a missing input file.
    pub fn input_missing(path: impl Into<PathBuf>) -> Self {
        Self::InputMissing { path: path.into() }
    }
}
