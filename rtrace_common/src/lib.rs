//! rtrace Common Library
//!
//! Wire formats and configuration shared by the emitting side
//! (`rtrace_core`, `rtrace_shm`) and the external control tool
//! (`rtrace_ctl`). Nothing in here performs I/O beyond reading a
//! configuration file.
//!
//! # Module Structure
//!
//! - [`consts`] - Ring and datagram size limits, default names
//! - [`record`] - Trace record header layout inside the ring store
//! - [`protocol`] - UDP datagram codec (`'T'`, `'C'`, `'R'` tags)
//! - [`config`] - TOML configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! rtrace_common = { workspace = true }
//! ```
//!
//! ```rust
//! use rtrace_common::consts::DATAGRAM_CAPACITY;
//! use rtrace_common::config::{ConfigLoader, TraceConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod protocol;
pub mod record;
