//! Ring store control header and mapped segment

use crate::error::{ShmError, ShmResult};
use crate::version::VersionCounter;
use memmap2::MmapMut;
use rtrace_common::consts::{RING_MAX_CAPACITY, RING_MIN_CAPACITY};
use static_assertions::const_assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Magic bytes identifying a ring store file: `"RTRACE\0\0"`.
pub const RING_MAGIC: [u8; 8] = *b"RTRACE\0\0";

/// Layout revision of [`RingHeader`] and the record framing.
pub const RING_LAYOUT_VERSION: u32 = 1;

/// Control header at offset 0 of every backing file, 64 bytes.
///
/// `cursor` counts every byte ever published; the ring offset of the next
/// write is `cursor % capacity` and the oldest valid record starts at
/// `(cursor - used) % capacity`. Both are only changed by the single writer
/// while `sequence` is odd.
#[repr(C, align(64))]
pub struct RingHeader {
    /// Magic number for validation
    pub magic: [u8; 8],
    /// Even/odd write sequence
    pub sequence: AtomicU64,
    /// Logical write cursor (bytes published since creation)
    pub cursor: AtomicU64,
    /// Records removed by eviction since creation
    pub evicted: AtomicU64,
    /// Creation timestamp (monotonic ns)
    pub created_ts: u64,
    /// Layout revision
    pub layout_version: u32,
    /// Ring data capacity in bytes
    pub capacity: u32,
    /// Writer process ID
    pub writer_pid: u32,
    /// Bytes of valid record data
    pub used: AtomicU32,
    /// Wake signal word, bumped after every publish
    pub doorbell: AtomicU32,
    _padding: [u8; 4],
}

const_assert_eq!(core::mem::size_of::<RingHeader>(), 64);
const_assert_eq!(core::mem::align_of::<RingHeader>(), 64);

/// Size of the control header preceding ring data.
pub const RING_HEADER_SIZE: usize = core::mem::size_of::<RingHeader>();

impl RingHeader {
    /// Create new ring header
    pub fn new(capacity: u32, writer_pid: u32, created_ts: u64) -> Self {
        Self {
            magic: RING_MAGIC,
            sequence: AtomicU64::new(0),
            cursor: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            created_ts,
            layout_version: RING_LAYOUT_VERSION,
            capacity,
            writer_pid,
            used: AtomicU32::new(0),
            doorbell: AtomicU32::new(0),
            _padding: [0; 4],
        }
    }

    /// Validate magic, layout revision and capacity against the mapped size
    pub fn validate(&self, path: &Path, mapped_len: usize) -> ShmResult<()> {
        let invalid = |reason: String| ShmError::InvalidLayout {
            path: path.display().to_string(),
            reason,
        };

        if self.magic != RING_MAGIC {
            return Err(invalid("bad magic".to_string()));
        }
        if self.layout_version != RING_LAYOUT_VERSION {
            return Err(invalid(format!(
                "layout version {} (expected {RING_LAYOUT_VERSION})",
                self.layout_version
            )));
        }
        let capacity = self.capacity as usize;
        if validate_capacity(capacity).is_err() || RING_HEADER_SIZE + capacity > mapped_len {
            return Err(invalid(format!(
                "capacity {capacity} does not fit mapping of {mapped_len} bytes"
            )));
        }
        Ok(())
    }

    /// Sequence counter wrapper
    pub fn version_counter(&self) -> VersionCounter<'_> {
        VersionCounter::new(&self.sequence)
    }

    /// Bytes of valid data
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire) as usize
    }

    /// Logical write cursor
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }
}

/// A mapped backing file: header followed by `capacity` ring bytes
pub struct RingSegment {
    /// Ring data capacity
    pub capacity: usize,
    mmap: MmapMut,
}

impl RingSegment {
    /// Wrap a mapping whose header has already been initialised
    pub fn new(capacity: usize, mmap: MmapMut) -> ShmResult<Self> {
        validate_capacity(capacity)?;
        if mmap.len() < RING_HEADER_SIZE + capacity {
            return Err(ShmError::InvalidCapacity {
                capacity,
                min: RING_MIN_CAPACITY,
                max: mmap.len().saturating_sub(RING_HEADER_SIZE),
            });
        }
        Ok(Self { capacity, mmap })
    }

    /// Get header reference
    pub fn header(&self) -> &RingHeader {
        // Mappings are page aligned, which satisfies the 64-byte alignment
        unsafe { &*(self.mmap.as_ptr() as *const RingHeader) }
    }

    /// Get data section pointer
    pub fn data_ptr(&self) -> *const u8 {
        unsafe { self.mmap.as_ptr().add(RING_HEADER_SIZE) }
    }

    /// Get mutable data section pointer (writer only)
    pub fn data_ptr_mut(&mut self) -> *mut u8 {
        unsafe { self.mmap.as_mut_ptr().add(RING_HEADER_SIZE) }
    }

    /// Copy `bytes` into the ring at logical position `pos`, wrapping
    pub fn write_wrapped(&mut self, pos: u64, bytes: &[u8]) {
        let capacity = self.capacity;
        debug_assert!(bytes.len() <= capacity);
        let offset = (pos % capacity as u64) as usize;
        let first = bytes.len().min(capacity - offset);
        let data = self.data_ptr_mut();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.add(offset), first);
            std::ptr::copy_nonoverlapping(bytes.as_ptr().add(first), data, bytes.len() - first);
        }
    }

    /// Copy ring bytes at logical position `pos` into `out`, wrapping
    pub fn read_wrapped(&self, pos: u64, out: &mut [u8]) {
        let capacity = self.capacity;
        debug_assert!(out.len() <= capacity);
        let offset = (pos % capacity as u64) as usize;
        let first = out.len().min(capacity - offset);
        let data = self.data_ptr();
        unsafe {
            std::ptr::copy_nonoverlapping(data.add(offset), out.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(data, out.as_mut_ptr().add(first), out.len() - first);
        }
    }
}

/// Validate ring capacity constraints
pub fn validate_capacity(capacity: usize) -> ShmResult<()> {
    if !(RING_MIN_CAPACITY..=RING_MAX_CAPACITY).contains(&capacity) {
        return Err(ShmError::InvalidCapacity {
            capacity,
            min: RING_MIN_CAPACITY,
            max: RING_MAX_CAPACITY,
        });
    }
    Ok(())
}
