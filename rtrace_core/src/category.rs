//! Trace categories and their handles

use crate::registry::Registry;
use bitflags::bitflags;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

bitflags! {
    /// One-byte category state
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CategoryState: u8 {
        /// Listed by a registry
        const REGISTERED = 1 << 0;
        /// Trace calls are recorded
        const ENABLED = 1 << 1;
    }
}

/// A named, toggleable class of trace statements within a module.
///
/// Owned by its [`CategoryHandle`]; a registry only keeps a weak reference.
#[derive(Debug)]
pub struct Category {
    module: String,
    name: String,
    state: AtomicU8,
}

impl Category {
    pub(crate) fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            state: AtomicU8::new(0),
        }
    }

    /// Module name
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Category name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state bits
    pub fn state(&self) -> CategoryState {
        CategoryState::from_bits_truncate(self.state.load(Ordering::Relaxed))
    }

    /// Lock-free enabled check.
    ///
    /// May observe a toggle made concurrently on another thread one call late.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state.load(Ordering::Relaxed) & CategoryState::ENABLED.bits() != 0
    }

    /// Whether a registry currently lists this category
    pub fn is_registered(&self) -> bool {
        self.state().contains(CategoryState::REGISTERED)
    }

    /// Set the enabled bit; returns `true` if it changed.
    ///
    /// Callers hold the registry's admin lock.
    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        let bit = CategoryState::ENABLED.bits();
        let previous = if enabled {
            self.state.fetch_or(bit, Ordering::Relaxed)
        } else {
            self.state.fetch_and(!bit, Ordering::Relaxed)
        };
        (previous & bit != 0) != enabled
    }

    pub(crate) fn mark_registered(&self) {
        self.state
            .fetch_or(CategoryState::REGISTERED.bits(), Ordering::AcqRel);
    }

    /// Clear the registered bit; returns `true` only for the first caller
    pub(crate) fn take_registered(&self) -> bool {
        let bit = CategoryState::REGISTERED.bits();
        self.state.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }
}

/// Call-site handle of a trace category.
///
/// Construction announces the category to a registry, which seeds its
/// enabled bit from the loaded default rules. Dropping the handle revokes it.
///
/// ```rust
/// use rtrace_core::{CategoryHandle, Registry};
///
/// let registry = Registry::new();
/// let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
/// assert!(!audio.is_enabled());
/// audio.enable(true);
/// assert!(audio.is_enabled());
/// ```
pub struct CategoryHandle {
    category: Arc<Category>,
    registry: Arc<Registry>,
}

impl CategoryHandle {
    /// Announce `(module, category)` to the process-wide registry
    pub fn new(module: &str, category: &str) -> Self {
        Self::with_registry(Registry::global(), module, category)
    }

    /// Announce `(module, category)` to `registry`
    pub fn with_registry(registry: &Arc<Registry>, module: &str, category: &str) -> Self {
        let category = Arc::new(Category::new(module, category));
        registry.announce(&category);
        Self {
            category,
            registry: Arc::clone(registry),
        }
    }

    /// Lock-free enabled check, cheap enough for every call site
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.category.is_enabled()
    }

    /// Enable or disable this category
    pub fn enable(&self, enabled: bool) {
        self.registry.set_enabled(&self.category, enabled);
    }

    /// Revoke from the registry. Later calls do nothing.
    pub fn destroy(&self) {
        if self.category.take_registered() {
            self.registry.revoke(&self.category);
        }
    }

    /// Write a record for this category, regardless of the enabled bit
    pub fn trace(&self, file: &str, line: u32, class: &str, payload: &[u8]) {
        self.registry.trace(&self.category, file, line, class, payload);
    }

    /// Module name
    pub fn module(&self) -> &str {
        self.category.module()
    }

    /// Category name
    pub fn category(&self) -> &str {
        self.category.name()
    }

    /// Whether a registry currently lists this handle
    pub fn is_registered(&self) -> bool {
        self.category.is_registered()
    }

    /// Registry this handle was announced to
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl Drop for CategoryHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for CategoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryHandle")
            .field("module", &self.module())
            .field("category", &self.category())
            .field("state", &self.category.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_enabled_reports_change() {
        let category = Category::new("Player", "Audio");
        assert!(category.set_enabled(true));
        assert!(!category.set_enabled(true));
        assert!(category.is_enabled());
        assert!(category.set_enabled(false));
        assert!(!category.set_enabled(false));
    }

    #[test]
    fn test_bits_are_independent() {
        let category = Category::new("Player", "Audio");
        category.mark_registered();
        category.set_enabled(true);
        assert_eq!(
            category.state(),
            CategoryState::REGISTERED | CategoryState::ENABLED
        );

        assert!(category.take_registered());
        assert!(!category.take_registered());
        assert!(category.is_enabled());
    }

    #[test]
    fn test_handle_destroy_is_idempotent() {
        let registry = Registry::new();
        let handle = CategoryHandle::with_registry(&registry, "Player", "Audio");
        assert!(handle.is_registered());
        assert_eq!(registry.category_count(), 1);

        handle.destroy();
        handle.destroy();
        assert!(!handle.is_registered());
        assert_eq!(registry.category_count(), 0);
    }

    #[test]
    fn test_drop_revokes() {
        let registry = Registry::new();
        {
            let _video = CategoryHandle::with_registry(&registry, "Player", "Video");
            assert_eq!(registry.category_count(), 1);
        }
        assert_eq!(registry.category_count(), 0);
    }

    #[test]
    fn test_enable_toggles_flag() {
        let registry = Registry::new();
        let handle = CategoryHandle::with_registry(&registry, "Player", "Audio");
        handle.enable(true);
        assert!(handle.is_enabled());
        handle.enable(false);
        assert!(!handle.is_enabled());
    }
}
