//! Error types for heap retention analysis.
//!
//! A target that turns out not to be retained is a normal answer and never
//! shows up here; see [`crate::analysis::RetentionResult`].

use thiserror::Error;

/// Everything that can abort an analysis, load a snapshot, or read config.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// A held value or the target is not a heap reference.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The heap edge source failed while enumerating or classifying.
    #[error("heap edge source failed: {0}")]
    Source(String),

    /// The heap edge source broke the identity or edge contract.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A heap snapshot description is malformed.
    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RetentionError>;
