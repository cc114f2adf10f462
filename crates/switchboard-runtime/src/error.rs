//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The update source failed.
    #[error("Update source error: {0}")]
    Source(String),

    /// `run_source` was called while another source is being driven.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
