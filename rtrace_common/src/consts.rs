//! System-wide constants for the rtrace workspace.
//!
//! Single source of truth for ring limits, datagram sizes and default
//! names. Imported by all crates, never duplicated.

/// Default backing-store file prefix (`<path>/<prefix>.<pid>`).
pub const DEFAULT_STORE_PREFIX: &str = "tracebuffer";

/// Default backing-store directory.
pub const DEFAULT_STORE_PATH: &str = "/tmp/rtrace";

/// Default ring data capacity in bytes (control header excluded).
pub const DEFAULT_RING_CAPACITY: usize = 64 * 1024;

/// Smallest ring capacity accepted by the store.
///
/// Large enough for a length prefix plus a few bytes; real stores are
/// far bigger, but tiny rings are useful for exercising eviction.
pub const RING_MIN_CAPACITY: usize = 16;

/// Largest ring capacity accepted by the store (256 MiB).
pub const RING_MAX_CAPACITY: usize = 256 * 1024 * 1024;

/// Largest single record, bounded by its 16-bit length prefix.
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

/// Fixed capacity of every datagram sent or accepted by the remote channel.
pub const DATAGRAM_CAPACITY: usize = 1024;

/// Default UDP port of the remote channel.
pub const DEFAULT_REMOTE_PORT: u16 = 5555;
