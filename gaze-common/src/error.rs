//! Common error types for the gaze tools

use thiserror::Error;

use crate::model::Subject;

/// Common result type for gaze operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the gaze crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error outside of annotation file parsing
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Annotation file could not be used at all
    #[error("Malformed annotation file '{file}': {reason}")]
    MalformedFile { file: String, reason: String },

    /// Two different categories claim the same frame for one subject
    #[error(
        "Overlapping ranges in '{file}' ({subject}): frame {frame} is both '{first}' and '{second}'"
    )]
    OverlappingRanges {
        file: String,
        subject: Subject,
        frame: u32,
        first: String,
        second: String,
    },
}

impl Error {
    pub(crate) fn malformed(file: &str, reason: impl Into<String>) -> Self {
        Error::MalformedFile {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}
