//! Prelude module for common re-exports.
//!
//! ```rust
//! use rtrace_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, LogLevel, RemoteConfig, SharedConfig, StoreConfig, TraceConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DATAGRAM_CAPACITY, MAX_RECORD_LEN, RING_MAX_CAPACITY, RING_MIN_CAPACITY};

// ─── Wire formats ───────────────────────────────────────────────────
pub use crate::protocol::{Command, Datagram, Response, TraceLine};
pub use crate::record::{RecordHeader, RecordView};
