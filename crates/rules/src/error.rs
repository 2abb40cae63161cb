//! Error types for policy loading, persistence and watching.

use std::path::PathBuf;

use crate::validation::ValidationReport;

/// Errors that can occur while loading, persisting or watching a policy file.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid UTF-8.
    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },

    /// Candidate content was rejected by strict validation.
    #[error("validation failed: {}", .0.messages.join("; "))]
    Invalid(ValidationReport),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
