//! Store discovery and orphan cleanup

use crate::error::ShmResult;
use crate::platform::is_process_alive;
use crate::reader::RingReader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store metadata information
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Backing file path
    pub path: PathBuf,
    /// Writer process ID
    pub pid: u32,
    /// Ring data capacity in bytes
    pub capacity: usize,
    /// Bytes of valid record data
    pub used: usize,
    /// Records evicted since creation
    pub evicted: u64,
    /// Whether the writer process still exists
    pub writer_alive: bool,
}

/// Finds `<prefix>.<pid>` store files in a directory
pub struct StoreDiscovery {
    dir: PathBuf,
    prefix: String,
}

impl StoreDiscovery {
    /// Discovery over `dir` for files named `<prefix>.<pid>`
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// List all valid stores, ordered by writer pid
    pub fn list(&self) -> ShmResult<Vec<StoreInfo>> {
        let mut stores = Vec::new();

        if !self.dir.exists() {
            return Ok(stores);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if self.pid_from_name(&path).is_none() {
                continue;
            }
            match Self::inspect(&path) {
                Ok(info) => stores.push(info),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable store"),
            }
        }

        stores.sort_by_key(|s| s.pid);
        Ok(stores)
    }

    /// Find the store written by `pid`
    pub fn find(&self, pid: u32) -> ShmResult<Option<StoreInfo>> {
        Ok(self.list()?.into_iter().find(|s| s.pid == pid))
    }

    /// Delete stores whose writer process no longer exists
    pub fn remove_orphaned(&self) -> ShmResult<usize> {
        let mut removed = 0;
        for store in self.list()? {
            if store.writer_alive {
                continue;
            }
            match std::fs::remove_file(&store.path) {
                Ok(()) => {
                    info!(path = %store.path.display(), pid = store.pid, "removed orphaned store");
                    removed += 1;
                }
                Err(e) => warn!(path = %store.path.display(), error = %e, "failed to remove orphaned store"),
            }
        }
        Ok(removed)
    }

    /// Read header metadata of one store file
    pub fn inspect(path: &Path) -> ShmResult<StoreInfo> {
        let reader = RingReader::attach(path)?;
        let pid = reader.writer_pid();
        Ok(StoreInfo {
            path: path.to_path_buf(),
            pid,
            capacity: reader.capacity(),
            used: reader.used(),
            evicted: reader.evicted(),
            writer_alive: is_process_alive(pid),
        })
    }

    fn pid_from_name(&self, path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        let pid = name.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        pid.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingStore;
    use crate::segment::{RING_HEADER_SIZE, RingHeader};

    /// Dead pid; above the kernel's pid_max ceiling
    const DEAD_PID: u32 = 0x7fff_fff0;

    fn write_stale_store(dir: &Path, prefix: &str, pid: u32) -> PathBuf {
        let header = RingHeader::new(64, pid, 0);
        let raw = unsafe {
            std::slice::from_raw_parts(&header as *const RingHeader as *const u8, RING_HEADER_SIZE)
        };
        let mut bytes = raw.to_vec();
        bytes.resize(RING_HEADER_SIZE + 64, 0);

        let path = dir.join(format!("{prefix}.{pid}"));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_list_finds_live_store() {
        let dir = tempfile::tempdir().unwrap();
        let _store = RingStore::create_for_process(dir.path(), "tracebuffer", 256).unwrap();

        let discovery = StoreDiscovery::new(dir.path(), "tracebuffer");
        let stores = discovery.list().unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].pid, std::process::id());
        assert_eq!(stores[0].capacity, 256);
        assert!(stores[0].writer_alive);
        assert!(discovery.find(std::process::id()).unwrap().is_some());
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tracebuffer.notapid"), b"x").unwrap();
        std::fs::write(dir.path().join("other.123"), b"x").unwrap();
        std::fs::write(dir.path().join("tracebuffer.77"), b"garbage").unwrap();

        let discovery = StoreDiscovery::new(dir.path(), "tracebuffer");
        assert!(discovery.list().unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let discovery = StoreDiscovery::new("/nonexistent/rtrace/dir", "tracebuffer");
        assert!(discovery.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove_orphaned_keeps_live_writers() {
        let dir = tempfile::tempdir().unwrap();
        let live = RingStore::create_for_process(dir.path(), "tracebuffer", 64).unwrap();
        let stale = write_stale_store(dir.path(), "tracebuffer", DEAD_PID);

        let discovery = StoreDiscovery::new(dir.path(), "tracebuffer");
        let stores = discovery.list().unwrap();
        assert_eq!(stores.len(), 2);
        assert!(!stores.iter().find(|s| s.pid == DEAD_PID).unwrap().writer_alive);

        assert_eq!(discovery.remove_orphaned().unwrap(), 1);
        assert!(!stale.exists());
        assert!(live.path().exists());
    }
}
