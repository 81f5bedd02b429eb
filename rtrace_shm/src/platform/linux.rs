//! Linux-specific ring store operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::{Metadata, OpenOptions};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Device and inode of a backing file.
///
/// Stays the same across renames, changes when the path is unlinked and
/// recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    /// Identity of the file currently at `path`
    pub fn of(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&std::fs::metadata(path)?))
    }

    fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

/// Create a new backing file of `size` bytes and map it shared.
///
/// Fails with [`ShmError::AlreadyExists`] if the file exists.
pub fn create_segment_mmap(path: &Path, size: usize) -> ShmResult<(MmapMut, FileId)> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ShmError::AlreadyExists {
                    path: path.display().to_string(),
                }
            } else {
                ShmError::Io { source: e }
            }
        })?;

    // Zero-filled by the kernel
    file.set_len(size as u64)?;

    // Pre-fault pages so the first trace does not take page faults
    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };

    Ok((mmap, FileId::from_metadata(&file.metadata()?)))
}

/// Attach to an existing backing file
pub fn attach_segment_mmap(path: &Path) -> ShmResult<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ShmError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ShmError::Io { source: e }
            }
        })?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // A null signal tests for existence without delivering anything
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// Monotonic clock in nanoseconds (`CLOCK_MONOTONIC`)
pub fn monotonic_ns() -> u64 {
    use nix::time::{ClockId, clock_gettime};

    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => (ts.tv_sec() as u64)
            .saturating_mul(1_000_000_000)
            .saturating_add(ts.tv_nsec() as u64),
        Err(_) => 0,
    }
}

/// Block while `word` still holds `expected`, up to `timeout`.
///
/// Uses a shared (non-private) futex, so waiter and waker may live in
/// different processes mapping the same file. Returns `false` only when
/// the timeout elapsed; any other return may be spurious.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    let result = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        )
    };

    !(result == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ETIMEDOUT))
}

/// Wake every waiter blocked on `word`
#[cfg(target_os = "linux")]
pub fn futex_wake(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Polling fallback for non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    use std::sync::atomic::Ordering;

    let step = Duration::from_millis(1);
    let nap = timeout.map_or(step, |t| t.min(step));
    std::thread::sleep(nap);
    word.load(Ordering::Acquire) != expected || timeout.is_none_or(|t| t > nap)
}

/// No-op on non-Linux platforms (waiters poll)
#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_word: &AtomicU32) {}
