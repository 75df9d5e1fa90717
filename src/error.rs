//! Crate-wide error type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while preparing or driving a fine-tuning run.
///
/// Training-loop failures are not enumerated here: the training backend is
/// an external collaborator and its errors propagate through the
/// [`Backend`](Error::Backend) variant unmodified.
#[derive(Debug, Error)]
pub enum Error {
    /// IO failure reading a checkpoint, corpus, or output directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a corpus or config file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A model parameter has no entry in the layer-placement table
    #[error("No device assignment for model component: {component}")]
    MissingPlacement { component: String },

    /// Checkpoint file missing or unreadable
    #[error("Checkpoint error at {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// SafeTensors serialization or deserialization failure
    #[error("SafeTensors error: {0}")]
    SafeTensors(String),

    /// Tokenizer loading or encoding failure
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Failure reported by the external training backend
    #[error("Training backend error: {0}")]
    Backend(String),
}
