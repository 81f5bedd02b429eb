//! Error types for registry operations

use rtrace_common::config::ConfigError;
use rtrace_shm::ShmError;
use thiserror::Error;

/// Errors surfaced by the registry and remote channel.
///
/// Best-effort paths (eviction, truncation, malformed datagrams) never
/// produce these.
#[derive(Error, Debug)]
pub enum TraceError {
    /// Ring store could not be created or attached
    #[error("Ring store error: {0}")]
    Store(#[from] ShmError),

    /// Default category rules are not valid JSON
    #[error("Invalid category rules: {0}")]
    Rules(#[from] serde_json::Error),

    /// Socket or file IO failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration failed to load or validate
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for registry operations
pub type TraceResult<T> = Result<T, TraceError>;
