//! Cross-process "data available" doorbell.
//!
//! The signal is a 32-bit word inside the mapped ring header. The writer
//! bumps it and issues a shared futex wake after publishing; consumers in
//! any process that maps the same file wait on it instead of polling.
//! Wakeups may be spurious, so waiters always re-check ring state.

use crate::platform::{futex_wait, futex_wake};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Doorbell view over a shared `AtomicU32`.
#[derive(Debug, Clone, Copy)]
pub struct WakeSignal<'a> {
    word: &'a AtomicU32,
}

impl<'a> WakeSignal<'a> {
    /// Wrap a shared doorbell word
    pub fn new(word: &'a AtomicU32) -> Self {
        Self { word }
    }

    /// Current doorbell value, to pass to [`wait`](Self::wait)
    pub fn current(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    /// Wake at least one waiter
    pub fn ring(&self) {
        self.word.fetch_add(1, Ordering::AcqRel);
        futex_wake(self.word);
    }

    /// Block until the doorbell moves past `seen` or `timeout` elapses.
    ///
    /// Returns `true` if the value changed. A `None` timeout waits forever.
    pub fn wait(&self, seen: u32, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.current() != seen {
                return true;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            // Spurious returns fall through to the re-check above
            futex_wait(self.word, seen, remaining);
        }
    }
}
