//! Error types shared by every pipeline stage

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, transforming, training or persisting
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Path is missing, unreadable or unwritable
    #[error("File error at {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input data or artifact could not be parsed
    #[error("Format error: {0}")]
    Format(String),

    /// Missing or invalid configuration field, or schema mismatch
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation invoked on an object in the wrong lifecycle state
    #[error("State error: {0}")]
    State(String),

    /// A bounded wait ran out of attempts
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl PipelineError {
    /// Wrap an I/O error together with the path it occurred on
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
