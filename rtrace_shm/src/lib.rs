//! # rtrace ring store
//!
//! Fixed-capacity, file-backed circular byte store for trace records,
//! shared between one writing process and any number of readers.
//!
//! ## Layout
//!
//! ```text
//! <dir>/<prefix>.<pid>
//! ┌──────────────────────────┬─────────────────────────────────────┐
//! │ RingHeader (64 bytes)    │ ring data (capacity bytes)          │
//! │ magic, sequence, cursor, │ [len|record][len|record]...         │
//! │ used, doorbell, ...      │                                     │
//! └──────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! Records are self-framing: each starts with its own `u16` little-endian
//! total length. When a new record does not fit, the store evicts whole
//! records from the oldest end until it does, so readers always see a
//! sequence of complete records.
//!
//! ## Writing
//!
//! ```rust
//! use rtrace_shm::RingStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::tempdir()?;
//! let mut store = RingStore::create(dir.path().join("ring"), 4096)?;
//! {
//!     let mut reservation = store.reserve(16);
//!     reservation.write(b"fourteen bytes");
//! } // published on drop
//! store.data_available();
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading
//!
//! A [`RingReader`] copies the valid region under the header's even/odd
//! sequence and retries while a write is in flight. Consumers block on the
//! header doorbell with [`RingReader::wait_for_data`] instead of polling.
//!
//! ## Thread Safety
//!
//! - **RingStore**: NOT thread-safe - single writer per store
//! - **RingReader**: one per consumer, any process

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod platform;
pub mod reader;
pub mod ring;
pub mod segment;
pub mod version;
pub mod wake;

pub use discovery::{StoreDiscovery, StoreInfo};
pub use error::{ShmError, ShmResult};
pub use reader::{Records, RingReader, Snapshot};
pub use ring::{Reservation, RingStore};
pub use segment::{RING_HEADER_SIZE, RING_LAYOUT_VERSION, RING_MAGIC, RingHeader};
pub use version::VersionCounter;
pub use wake::WakeSignal;
