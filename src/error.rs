//! Error types for defect-prediction runs.
//!
//! Configuration and data problems surface here before any scheduling
//! starts. Recoverable training conditions (a batch with a single class)
//! are logged instead and never reach this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, JitError>;

/// Errors that can occur while preparing or running an experiment.
#[derive(Debug, Error)]
pub enum JitError {
    /// A configuration value is out of its accepted range.
    #[error("invalid config: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Dataset name is not part of the catalogue.
    #[error("unknown dataset: {name}")]
    UnknownDataset { name: String },

    /// Dataset file not found at specified path.
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: PathBuf },

    /// Commit or event data violates a stream invariant.
    #[error("invalid data: {reason}")]
    InvalidData { reason: String },

    /// Feature vector has the wrong length.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// I/O error during file operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Checkpoint could not be written, or failed its checks on load.
    #[error("invalid checkpoint: {reason}")]
    Checkpoint { reason: String },
}

impl JitError {
    /// Create a new invalid config error.
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid data error.
    #[must_use]
    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData {
            reason: reason.into(),
        }
    }

    /// Create a checkpoint error.
    #[must_use]
    pub fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            reason: reason.into(),
        }
    }

    /// Create an unknown dataset error.
    #[must_use]
    pub fn unknown_dataset(name: impl Into<String>) -> Self {
        Self::UnknownDataset { name: name.into() }
    }
}

impl From<serde_json::Error> for JitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for JitError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for JitError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
