//! Process-wide category registry and trace sink.
//!
//! One admin lock serialises category bookkeeping and every write into the
//! ring store, which makes the store single-writer. Enabled checks on the
//! call-site side never take it.
//!
//! Category lookups are linear scans; cost is O(#categories) per
//! announce, toggle or rule reload.

use crate::category::Category;
use crate::error::TraceResult;
use crate::remote::RemoteChannel;
use crate::rule::{EnabledRule, last_match, parse_rules, pattern_matches, rules_to_json};
use parking_lot::Mutex;
use rtrace_common::config::{RemoteConfig, StoreConfig, TraceConfig};
use rtrace_common::consts::MAX_RECORD_LEN;
use rtrace_common::record::RecordHeader;
use rtrace_shm::platform::{get_current_pid, monotonic_ns};
use rtrace_shm::{RingStore, ShmError, StoreDiscovery};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, info, trace, warn};

static GLOBAL: LazyLock<Arc<Registry>> = LazyLock::new(Registry::new);

/// Snapshot of one registered category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    /// Module name
    pub module: String,
    /// Category name
    pub category: String,
    /// Current enabled state
    pub enabled: bool,
}

struct Admin {
    categories: Vec<Weak<Category>>,
    rules: Vec<EnabledRule>,
    store: Option<RingStore>,
    remote: Option<RemoteChannel>,
    /// Reused header encoding buffer
    scratch: Vec<u8>,
}

impl Admin {
    fn live(&self) -> impl Iterator<Item = Arc<Category>> + '_ {
        self.categories.iter().filter_map(Weak::upgrade)
    }
}

/// Owner of the category list, default rules, ring store and remote channel
pub struct Registry {
    admin: Mutex<Admin>,
}

impl Registry {
    /// Independent registry, mainly for tests and embedding.
    ///
    /// Most code uses [`Registry::global`].
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            admin: Mutex::new(Admin {
                categories: Vec::new(),
                rules: Vec::new(),
                store: None,
                remote: None,
                scratch: Vec::with_capacity(256),
            }),
        })
    }

    /// Process-wide registry, created on first use
    pub fn global() -> &'static Arc<Registry> {
        &GLOBAL
    }

    /// Add a category, seeding its enabled bit from the last matching rule.
    ///
    /// Categories without a matching rule start disabled.
    pub fn announce(&self, category: &Arc<Category>) {
        let mut admin = self.admin.lock();
        if category.is_registered() {
            return;
        }
        admin.categories.retain(|weak| weak.strong_count() > 0);

        if let Some(rule) = last_match(&admin.rules, category.module(), category.name()) {
            category.set_enabled(rule.enabled);
        }
        category.mark_registered();
        admin.categories.push(Arc::downgrade(category));

        debug!(
            module = category.module(),
            category = category.name(),
            enabled = category.is_enabled(),
            "category announced"
        );
    }

    /// Remove a category. Absent categories are ignored.
    pub fn revoke(&self, category: &Category) {
        let mut admin = self.admin.lock();
        let listed = admin
            .categories
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), category));
        admin
            .categories
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), category));
        if listed {
            // Only the owning registry clears the bit
            category.take_registered();
            debug!(
                module = category.module(),
                category = category.name(),
                "category revoked"
            );
        }
    }

    /// Set one category's enabled bit; returns `true` if it changed
    pub fn set_enabled(&self, category: &Category, enabled: bool) -> bool {
        let _admin = self.admin.lock();
        category.set_enabled(enabled)
    }

    /// Set every category matching both patterns; returns how many changed.
    ///
    /// An empty pattern matches any name.
    pub fn set_categories(&self, enable: bool, module: &str, category: &str) -> usize {
        let admin = self.admin.lock();
        let modified = admin
            .live()
            .filter(|c| pattern_matches(module, c.module()) && pattern_matches(category, c.name()))
            .filter(|c| c.set_enabled(enable))
            .count();
        info!(enable, module, category, modified, "categories toggled");
        modified
    }

    /// Every registered category with its state
    pub fn categories(&self) -> Vec<CategoryInfo> {
        self.admin
            .lock()
            .live()
            .filter(|c| c.is_registered())
            .map(|c| CategoryInfo {
                module: c.module().to_string(),
                category: c.name().to_string(),
                enabled: c.is_enabled(),
            })
            .collect()
    }

    /// Number of registered categories
    pub fn category_count(&self) -> usize {
        self.admin
            .lock()
            .live()
            .filter(|c| c.is_registered())
            .count()
    }

    /// Replace the default rules and apply them to registered categories.
    ///
    /// Each category takes the state of the last rule matching it;
    /// categories matched by no rule keep their state.
    pub fn set_default_rules(&self, rules: Vec<EnabledRule>) {
        let mut admin = self.admin.lock();
        admin.rules = rules;

        let mut changed = 0;
        for category in admin.live() {
            if let Some(rule) = last_match(&admin.rules, category.module(), category.name()) {
                changed += usize::from(category.set_enabled(rule.enabled));
            }
        }
        debug!(rules = admin.rules.len(), changed, "default rules applied");
    }

    /// Current default rules
    pub fn default_rules(&self) -> Vec<EnabledRule> {
        self.admin.lock().rules.clone()
    }

    /// Replace the default rules from a JSON array.
    ///
    /// Malformed JSON leaves the current rules in place.
    pub fn set_default_categories_json(&self, json: &str) -> TraceResult<()> {
        let rules = parse_rules(json)?;
        self.set_default_rules(rules);
        Ok(())
    }

    /// Default rules as a JSON array
    pub fn default_categories_json(&self) -> TraceResult<String> {
        Ok(rules_to_json(&self.admin.lock().rules)?)
    }

    /// Load default rules from a JSON file
    pub fn load_default_categories(&self, path: &Path) -> TraceResult<()> {
        self.set_default_rules(read_rules(path)?);
        Ok(())
    }

    /// State of the last default rule matching the pair, if any
    pub fn is_default_category(&self, module: &str, category: &str) -> Option<bool> {
        let admin = self.admin.lock();
        last_match(&admin.rules, module, category).map(|rule| rule.enabled)
    }

    /// Write one record for `category` into the ring store and mirror it.
    ///
    /// The mirror datagram is encoded under the admin lock and sent after
    /// releasing it.
    ///
    /// The requested length is clamped to the 16-bit record limit. If the
    /// granted space cannot hold the header nothing is written; otherwise
    /// the payload is cut to fit. No store open means no local record.
    pub fn trace(&self, category: &Category, file: &str, line: u32, class: &str, payload: &[u8]) {
        let header = RecordHeader {
            timestamp: monotonic_ns(),
            line,
            file,
            module: category.module(),
            category: category.name(),
            class,
        };

        let mut admin = self.admin.lock();
        let Admin {
            store,
            remote,
            scratch,
            ..
        } = &mut *admin;

        if let Some(store) = store.as_mut() {
            write_record(store, scratch, &header, payload);
        }
        let mirror = remote.as_ref().and_then(|r| r.prepare(&header, payload));
        drop(admin);

        if let Some(mirror) = mirror {
            mirror.send();
        }
    }

    /// Create `<path>/<prefix>.<pid>` and route records into it.
    ///
    /// An existing file at that path is replaced only when it is stale: no
    /// store in this process owns it and its writer is gone or was an
    /// earlier process with our pid. Otherwise this fails with
    /// [`ShmError::AlreadyExists`].
    ///
    /// # Panics
    ///
    /// If a store is already open.
    pub fn open(&self, config: &StoreConfig) -> TraceResult<PathBuf> {
        let mut admin = self.admin.lock();
        assert!(admin.store.is_none(), "trace store already open");

        std::fs::create_dir_all(&config.path)?;
        let path = config.file_for(get_current_pid());
        let store = match RingStore::create(&path, config.capacity) {
            Err(ShmError::AlreadyExists { .. }) if is_stale_store(&path) => {
                warn!(path = %path.display(), "replacing stale trace store");
                std::fs::remove_file(&path)?;
                RingStore::create(&path, config.capacity)?
            }
            other => other?,
        };

        info!(path = %path.display(), capacity = config.capacity, "trace store open");
        admin.store = Some(store);
        Ok(path)
    }

    /// Close and delete the ring store
    pub fn close(&self) {
        let store = self.admin.lock().store.take();
        if let Some(store) = store {
            info!(path = %store.path().display(), "trace store closed");
        }
    }

    /// Backing file of the open store
    pub fn store_path(&self) -> Option<PathBuf> {
        self.admin
            .lock()
            .store
            .as_ref()
            .map(|s| s.path().to_path_buf())
    }

    /// Start the remote channel, replacing any running one
    pub fn open_remote(self: &Arc<Self>, config: &RemoteConfig) -> TraceResult<SocketAddr> {
        let channel = RemoteChannel::open(config, Arc::downgrade(self))?;
        let addr = channel.local_addr();
        let previous = self.admin.lock().remote.replace(channel);
        // Joined outside the lock; the worker may be waiting on it
        drop(previous);
        Ok(addr)
    }

    /// Stop the remote channel
    pub fn close_remote(&self) {
        let channel = self.admin.lock().remote.take();
        drop(channel);
    }

    /// Bound address of the remote channel
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.admin.lock().remote.as_ref().map(RemoteChannel::local_addr)
    }

    /// Open everything `config` describes.
    ///
    /// Default rules are read before the store is opened, so a bad rules
    /// file leaves nothing open. A remote channel that fails to bind is logged and skipped.
    pub fn configure(self: &Arc<Self>, config: &TraceConfig) -> TraceResult<()> {
        config.validate()?;
        let rules = config
            .defaults
            .categories
            .as_deref()
            .map(read_rules)
            .transpose()?;

        self.open(&config.store)?;
        if let Some(rules) = rules {
            self.set_default_rules(rules);
        }
        if let Some(remote) = &config.remote {
            if let Err(e) = self.open_remote(remote) {
                warn!(bind = %remote.bind, error = %e, "remote channel unavailable");
            }
        }
        Ok(())
    }

    /// Stop the remote channel, force-revoke every category and close the store
    pub fn shutdown(&self) {
        self.close_remote();

        let (store, revoked) = {
            let mut admin = self.admin.lock();
            let revoked = admin.live().filter(|c| c.take_registered()).count();
            admin.categories.clear();
            (admin.store.take(), revoked)
        };
        drop(store);

        info!(revoked, "trace registry shut down");
    }
}

/// Parse a JSON rules file
fn read_rules(path: &Path) -> TraceResult<Vec<EnabledRule>> {
    let rules = parse_rules(&std::fs::read_to_string(path)?)?;
    info!(path = %path.display(), rules = rules.len(), "default categories loaded");
    Ok(rules)
}

/// True if the store file at `path` has no live writer
fn is_stale_store(path: &Path) -> bool {
    if RingStore::is_open_in_process(path) {
        return false;
    }
    match StoreDiscovery::inspect(path) {
        // Same pid but not ours in this process: a previous process
        Ok(info) => info.pid == get_current_pid() || !info.writer_alive,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable store file");
            true
        }
    }
}

fn write_record(
    store: &mut RingStore,
    scratch: &mut Vec<u8>,
    header: &RecordHeader<'_>,
    payload: &[u8],
) {
    let header_len = header.encoded_len();
    if header_len > store.capacity().min(MAX_RECORD_LEN) {
        debug!(header_len, capacity = store.capacity(), "record header exceeds store, dropped");
        return;
    }

    let requested = (header_len + payload.len()).min(MAX_RECORD_LEN);
    let mut reservation = store.reserve(requested);
    if reservation.len() < header_len {
        reservation.cancel();
        return;
    }

    scratch.clear();
    header.encode_body(scratch);
    reservation.write(scratch);
    let written = reservation.write(payload);
    if written < payload.len() {
        trace!(dropped = payload.len() - written, "payload truncated");
    }
    drop(reservation);

    store.data_available();
}
