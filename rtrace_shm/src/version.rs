//! Even/odd sequence counter for optimistic concurrency control

use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Sequence counter view over the ring header's shared `AtomicU64`.
///
/// The writer makes the value odd while it evicts and writes, and even
/// again once the record is published. Readers compare the value before
/// and after copying to detect a concurrent modification.
#[derive(Debug, Clone, Copy)]
pub struct VersionCounter<'a> {
    counter: &'a AtomicU64,
}

impl<'a> VersionCounter<'a> {
    /// Wrap a shared counter
    pub fn new(counter: &'a AtomicU64) -> Self {
        Self { counter }
    }

    /// Get current version with acquire ordering
    pub fn load(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Begin write operation - increment to odd version
    pub fn begin_write(&self) -> u64 {
        let next = self.counter.load(Ordering::Relaxed) + 1;
        self.counter.store(next, Ordering::Relaxed);
        // Odd value must be visible before any data write
        fence(Ordering::Release);
        next
    }

    /// Complete write operation - increment to even version
    pub fn end_write(&self) -> u64 {
        let next = self.counter.load(Ordering::Relaxed) + 1;
        self.counter.store(next, Ordering::Release);
        next
    }

    /// Check if version is stable (even)
    pub fn is_stable(version: u64) -> bool {
        version % 2 == 0
    }

    /// Check if version indicates write in progress (odd)
    pub fn is_writing(version: u64) -> bool {
        version % 2 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_cycle() {
        let raw = AtomicU64::new(0);
        let counter = VersionCounter::new(&raw);

        // Begin write - should be odd
        let v1 = counter.begin_write();
        assert_eq!(v1, 1);
        assert!(VersionCounter::is_writing(v1));

        // End write - should be even
        let v2 = counter.end_write();
        assert_eq!(v2, 2);
        assert!(VersionCounter::is_stable(v2));
        assert_eq!(raw.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_version_validation() {
        assert!(VersionCounter::is_stable(0));
        assert!(VersionCounter::is_stable(2));
        assert!(VersionCounter::is_stable(100));

        assert!(VersionCounter::is_writing(1));
        assert!(VersionCounter::is_writing(3));
        assert!(VersionCounter::is_writing(99));
    }
}
