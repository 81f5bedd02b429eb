//! Single-writer ring store with whole-record eviction

use crate::error::ShmResult;
use crate::platform::{FileId, create_segment_mmap, get_current_pid, monotonic_ns};
use crate::segment::{RING_HEADER_SIZE, RingHeader, RingSegment, validate_capacity};
use crate::wake::WakeSignal;
use rtrace_common::config::store_file;
use rtrace_common::consts::MAX_RECORD_LEN;
use rtrace_common::record::LEN_PREFIX;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{Ordering, fence};
use tracing::{debug, info, trace, warn};

/// Backing files of the stores currently alive in this process
static OPEN_FILES: LazyLock<Mutex<HashSet<FileId>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Fixed-capacity circular byte store backed by a shared file mapping.
///
/// Every record begins with its own `u16` little-endian length, written by
/// the store when space is granted. Eviction walks those prefixes from the
/// oldest record, so it only ever drops whole records.
///
/// Not thread-safe: callers serialise access (the registry's admin lock).
pub struct RingStore {
    segment: RingSegment,
    path: PathBuf,
    file_id: FileId,
    writer_pid: u32,
}

impl RingStore {
    /// Create a new store at `path` with `capacity` bytes of ring data
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> ShmResult<Self> {
        validate_capacity(capacity)?;

        let path = path.as_ref().to_path_buf();
        let writer_pid = get_current_pid();
        let (mut mmap, file_id) = create_segment_mmap(&path, RING_HEADER_SIZE + capacity)?;

        // Initialise control header in place
        unsafe {
            std::ptr::write(
                mmap.as_mut_ptr() as *mut RingHeader,
                RingHeader::new(capacity as u32, writer_pid, monotonic_ns()),
            );
        }

        // Header must be visible before anyone attaches
        fence(Ordering::Release);

        let segment = RingSegment::new(capacity, mmap)?;
        OPEN_FILES.lock().insert(file_id);
        info!(path = %path.display(), capacity, "ring store created");

        Ok(Self {
            segment,
            path,
            file_id,
            writer_pid,
        })
    }

    /// True if a store alive in this process owns the file at `path`
    pub fn is_open_in_process(path: &Path) -> bool {
        FileId::of(path).is_ok_and(|id| OPEN_FILES.lock().contains(&id))
    }

    /// Create `<dir>/<prefix>.<pid>` for the current process
    pub fn create_for_process(dir: &Path, prefix: &str, capacity: usize) -> ShmResult<Self> {
        std::fs::create_dir_all(dir)?;
        Self::create(store_file(dir, prefix, get_current_pid()), capacity)
    }

    /// Request room for a record of `requested` bytes.
    ///
    /// The grant is `requested` clamped to the ring capacity and to the
    /// 16-bit record limit, after evicting as many of the oldest records as
    /// needed. Requests shorter than the length prefix get an empty grant.
    pub fn reserve(&mut self, requested: usize) -> Reservation<'_> {
        self.segment.header().version_counter().begin_write();

        let wanted = requested.min(self.segment.capacity).min(MAX_RECORD_LEN);
        if wanted < LEN_PREFIX {
            let start = self.cursor();
            return Reservation {
                store: self,
                start,
                granted: 0,
                written: 0,
                publish: false,
            };
        }

        self.make_room(wanted);

        let start = self.cursor();
        let mut reservation = Reservation {
            store: self,
            start,
            granted: wanted,
            written: 0,
            publish: true,
        };
        reservation.write(&(wanted as u16).to_le_bytes());
        reservation
    }

    /// Evict oldest records until `wanted` bytes are free
    fn make_room(&mut self, wanted: usize) {
        let capacity = self.segment.capacity;
        let header = self.segment.header();
        let cursor = header.cursor();
        let mut used = header.used();
        let mut evicted = 0u64;

        while capacity - used < wanted {
            let head = cursor - used as u64;
            let len = if used >= LEN_PREFIX {
                let mut prefix = [0u8; LEN_PREFIX];
                self.segment.read_wrapped(head, &mut prefix);
                u16::from_le_bytes(prefix) as usize
            } else {
                0
            };

            if len < LEN_PREFIX || len > used {
                warn!(
                    offset = head % capacity as u64,
                    len, used, "corrupt record length, discarding ring contents"
                );
                used = 0;
                break;
            }

            trace!(offset = head % capacity as u64, len, "evicting record");
            used -= len;
            evicted += 1;
        }

        header.used.store(used as u32, Ordering::Release);
        if evicted > 0 {
            header.evicted.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted, wanted, "made room in ring store");
        }
    }

    /// Ring the wake signal so waiting consumers resume
    pub fn data_available(&self) {
        WakeSignal::new(&self.segment.header().doorbell).ring();
    }

    /// Ring data capacity in bytes
    pub fn capacity(&self) -> usize {
        self.segment.capacity
    }

    /// Bytes currently held by valid records
    pub fn used(&self) -> usize {
        self.segment.header().used()
    }

    /// Bytes available without eviction
    pub fn free(&self) -> usize {
        self.segment.capacity - self.used()
    }

    /// Logical write cursor
    pub fn cursor(&self) -> u64 {
        self.segment.header().cursor()
    }

    /// Records evicted since creation
    pub fn evicted(&self) -> u64 {
        self.segment.header().evicted.load(Ordering::Relaxed)
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get writer process ID
    pub fn writer_pid(&self) -> u32 {
        self.writer_pid
    }
}

impl Drop for RingStore {
    fn drop(&mut self) {
        OPEN_FILES.lock().remove(&self.file_id);

        // Cleanup on writer exit, unless the path now names another file
        match FileId::of(&self.path) {
            Ok(id) if id == self.file_id => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    debug!(path = %self.path.display(), error = %e, "ring store file not removed");
                }
            }
            Ok(_) => debug!(path = %self.path.display(), "ring store file replaced, left in place"),
            Err(e) => debug!(path = %self.path.display(), error = %e, "ring store file already gone"),
        }
    }
}

/// Space granted by [`RingStore::reserve`].
///
/// The length prefix is already written. Bytes written through the
/// reservation follow it; on drop any unwritten remainder is zero-filled
/// and the record is published in one step.
pub struct Reservation<'a> {
    store: &'a mut RingStore,
    start: u64,
    granted: usize,
    written: usize,
    publish: bool,
}

impl Reservation<'_> {
    /// Granted record length, length prefix included
    pub fn len(&self) -> usize {
        self.granted
    }

    /// True when nothing was granted
    pub fn is_empty(&self) -> bool {
        self.granted == 0
    }

    /// Bytes that can still be written
    pub fn remaining(&self) -> usize {
        self.granted - self.written
    }

    /// Append up to [`remaining`](Self::remaining) bytes; returns bytes taken
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        if n > 0 {
            self.store
                .segment
                .write_wrapped(self.start + self.written as u64, &bytes[..n]);
            self.written += n;
        }
        n
    }

    /// Drop the reservation without publishing a record.
    ///
    /// Space already freed by eviction stays free.
    pub fn cancel(mut self) {
        self.publish = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.publish {
            const ZEROS: [u8; 64] = [0; 64];
            while self.remaining() > 0 {
                let n = self.remaining().min(ZEROS.len());
                self.write(&ZEROS[..n]);
            }

            let header = self.store.segment.header();
            let used = header.used() + self.granted;
            header.used.store(used as u32, Ordering::Release);
            header
                .cursor
                .store(self.start + self.granted as u64, Ordering::Release);
        }
        self.store.segment.header().version_counter().end_write();
    }
}
