//! Error types for stevedore
//!
//! Fatal errors only: configuration problems that prevent a run from
//! starting, the initial connection failure, and manifest IO. Per-file
//! transfer errors and per-command failures are captured as data inside
//! `DeployReport` and never propagate past the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for stevedore operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal errors for stevedore operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing or invalid configuration (run never starts)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Initial connection failure (fatal to the whole run)
    #[error("connection failed: {0}")]
    Connection(#[from] TransportError),

    /// Manifest could not be read or written
    #[error("manifest error at {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
