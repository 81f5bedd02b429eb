//! Out-of-process reader for ring stores

use crate::error::{ShmError, ShmResult};
use crate::platform::{attach_segment_mmap, is_process_alive};
use crate::segment::{RING_HEADER_SIZE, RingHeader, RingSegment};
use crate::version::VersionCounter;
use crate::wake::WakeSignal;
use rtrace_common::record::{LEN_PREFIX, RecordError, RecordView, peek_len};
use std::path::{Path, PathBuf};
use std::sync::atomic::{Ordering, fence};
use std::time::Duration;
use tracing::debug;

/// Attempts before a snapshot gives up on a busy writer
const MAX_READ_RETRIES: usize = 64;

/// Consistent copy of the valid ring contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Logical position of the first copied byte (a record start)
    pub start: u64,
    /// Logical write cursor at the time of the copy
    pub end: u64,
    /// Bytes the reader never saw because they were evicted first
    pub lost_bytes: u64,
    /// Record bytes, oldest first
    pub bytes: Vec<u8>,
}

impl Snapshot {
    /// Iterate the records held in this snapshot
    pub fn records(&self) -> Records<'_> {
        Records { rest: &self.bytes }
    }

    /// True when there are no record bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Iterator over the records of a [`Snapshot`].
///
/// A record whose fields fail to decode is reported and skipped; a bad
/// length prefix ends iteration since the next record start is unknown.
pub struct Records<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RecordView<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let available = self.rest.len();
        let len = match peek_len(self.rest) {
            Some(len) if (LEN_PREFIX..=available).contains(&len) => len,
            Some(declared) => {
                self.rest = &[];
                return Some(Err(RecordError::BadLength {
                    declared,
                    available,
                }));
            }
            None => {
                self.rest = &[];
                return Some(Err(RecordError::Truncated { available }));
            }
        };

        let (record, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(RecordView::parse(record))
    }
}

/// Reader attached to a ring store written by another process (or thread).
///
/// Tracks its own position so repeated [`read_new`](Self::read_new) calls
/// return each record once, reporting anything evicted in between.
pub struct RingReader {
    segment: RingSegment,
    path: PathBuf,
    position: u64,
}

impl RingReader {
    /// Attach to the store file at `path`, starting at its oldest record
    pub fn attach(path: impl AsRef<Path>) -> ShmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = attach_segment_mmap(&path)?;

        if mmap.len() < RING_HEADER_SIZE {
            return Err(ShmError::InvalidLayout {
                path: path.display().to_string(),
                reason: format!("file of {} bytes has no header", mmap.len()),
            });
        }

        // Validate control header
        let header = unsafe { &*(mmap.as_ptr() as *const RingHeader) };
        header.validate(&path, mmap.len())?;
        let capacity = header.capacity as usize;

        let segment = RingSegment::new(capacity, mmap)?;
        let header = segment.header();
        let position = header.cursor().saturating_sub(header.used() as u64);
        debug!(path = %path.display(), capacity, "attached to ring store");

        Ok(Self {
            segment,
            path,
            position,
        })
    }

    /// Copy the valid contents without blocking the writer
    pub fn snapshot(&self) -> ShmResult<Snapshot> {
        let header = self.segment.header();
        let capacity = self.segment.capacity;

        for _attempt in 0..MAX_READ_RETRIES {
            let before = header.sequence.load(Ordering::Acquire);

            // Skip if write is in progress
            if !VersionCounter::is_stable(before) {
                std::thread::yield_now();
                continue;
            }

            let end = header.cursor();
            let used = header.used().min(capacity).min(end as usize);
            let start = end - used as u64;
            let mut bytes = vec![0u8; used];
            self.segment.read_wrapped(start, &mut bytes);

            fence(Ordering::Acquire);

            // Conflict detection
            if header.sequence.load(Ordering::Acquire) == before {
                return Ok(Snapshot {
                    start,
                    end,
                    lost_bytes: 0,
                    bytes,
                });
            }

            std::thread::yield_now();
        }

        Err(ShmError::VersionConflict)
    }

    /// Records published since the previous call
    pub fn read_new(&mut self) -> ShmResult<Snapshot> {
        let mut snapshot = self.snapshot()?;

        if self.position < snapshot.start {
            snapshot.lost_bytes = snapshot.start - self.position;
        } else {
            let skip = (self.position - snapshot.start).min(snapshot.bytes.len() as u64);
            snapshot.bytes.drain(..skip as usize);
            snapshot.start += skip;
        }

        self.position = snapshot.end;
        Ok(snapshot)
    }

    /// Skip everything currently held
    pub fn seek_to_end(&mut self) {
        self.position = self.segment.header().cursor();
    }

    /// Block until records newer than the read position are published.
    ///
    /// Returns `false` on timeout. A `None` timeout waits forever.
    pub fn wait_for_data(&self, timeout: Option<Duration>) -> bool {
        let header = self.segment.header();
        let signal = WakeSignal::new(&header.doorbell);
        let seen = signal.current();
        if header.cursor() != self.position {
            return true;
        }
        signal.wait(seen, timeout) || header.cursor() != self.position
    }

    /// Logical position of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Ring data capacity
    pub fn capacity(&self) -> usize {
        self.segment.capacity
    }

    /// Bytes of valid data right now
    pub fn used(&self) -> usize {
        self.segment.header().used()
    }

    /// Records evicted since creation
    pub fn evicted(&self) -> u64 {
        self.segment.header().evicted.load(Ordering::Relaxed)
    }

    /// Writer process ID recorded in the header
    pub fn writer_pid(&self) -> u32 {
        self.segment.header().writer_pid
    }

    /// Whether the writing process still exists
    pub fn is_writer_alive(&self) -> bool {
        is_process_alive(self.writer_pid())
    }

    /// Creation timestamp (monotonic ns)
    pub fn created_ts(&self) -> u64 {
        self.segment.header().created_ts
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
