//! Error types for ring store operations

use thiserror::Error;

/// Errors that can occur during ring store operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Backing file already exists
    #[error("Ring store already exists: {path}")]
    AlreadyExists {
        /// Backing file path
        path: String,
    },

    /// Backing file not found
    #[error("Ring store not found: {path}")]
    NotFound {
        /// Backing file path
        path: String,
    },

    /// Invalid ring capacity
    #[error("Invalid ring capacity: {capacity} bytes (must be {min}..={max})")]
    InvalidCapacity {
        /// Attempted capacity in bytes
        capacity: usize,
        /// Smallest accepted capacity
        min: usize,
        /// Largest accepted capacity
        max: usize,
    },

    /// File is not a ring store or was written by an incompatible layout
    #[error("Invalid ring layout in {path}: {reason}")]
    InvalidLayout {
        /// Backing file path
        path: String,
        /// What failed validation
        reason: String,
    },

    /// Writer kept the ring busy for every read attempt
    #[error("Version conflict detected - retry recommended")]
    VersionConflict,

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for ring store operations
pub type ShmResult<T> = Result<T, ShmError>;
