//! Centralized error types for mailarchiver.
//!
//! Only storage and configuration problems are errors. Malformed MIME input
//! never produces an error: the parser falls back to raw values instead.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailarchiver library.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Metadata or index line could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The configuration file exists but could not be used.
    #[error("Invalid configuration '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// The archive root exists but is not a directory.
    #[error("Archive root is not a directory: {0}")]
    InvalidRoot(PathBuf),
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Path involved in the failure, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::Config { path, .. } => Some(path),
            Self::InvalidRoot(path) => Some(path),
            Self::Serialize(_) => None,
        }
    }
}
