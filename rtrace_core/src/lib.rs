//! # rtrace core
//!
//! Category registry and trace sink for processes writing into an rtrace
//! ring store.
//!
//! Each trace category is a [`CategoryHandle`] owned by the code that emits
//! it. Checking [`CategoryHandle::is_enabled`] is a single relaxed atomic
//! load; only enabled call sites pay for formatting and the write into the
//! ring, which happens under the registry's admin lock.
//!
//! ```rust
//! use rtrace_core::{CategoryHandle, Registry, rtrace};
//! use rtrace_common::config::StoreConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempfile::tempdir()?;
//! let registry = Registry::new();
//! registry.open(&StoreConfig {
//!     path: dir.path().to_path_buf(),
//!     ..StoreConfig::default()
//! })?;
//!
//! let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
//! registry.set_categories(true, "Player", "");
//! rtrace!(audio, "underrun after {} frames", 480);
//! # Ok(())
//! # }
//! ```
//!
//! Processes normally use the global registry: create handles with
//! [`CategoryHandle::new`], call [`Registry::configure`] once at startup on
//! [`Registry::global`] and [`shutdown`] before exit.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod category;
pub mod error;
pub mod registry;
pub mod remote;
pub mod rule;

pub use category::{Category, CategoryHandle, CategoryState};
pub use error::{TraceError, TraceResult};
pub use registry::{CategoryInfo, Registry};
pub use remote::{Mirror, RemoteChannel};
pub use rule::EnabledRule;

use rtrace_common::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Record a formatted message if `handle` is enabled.
///
/// Formatting only happens for enabled handles. The call site's
/// `file!()`, `line!()` and `module_path!()` fill the record header.
#[macro_export]
macro_rules! rtrace {
    ($handle:expr, $($arg:tt)+) => {{
        let handle = &$handle;
        if handle.is_enabled() {
            let message = ::std::format!($($arg)+);
            handle.trace(
                ::std::file!(),
                ::std::line!(),
                ::std::module_path!(),
                message.as_bytes(),
            );
        }
    }};
}

/// Tear down the global registry: force-revoke categories, close the store
pub fn shutdown() {
    Registry::global().shutdown();
}

/// Initialize tracing for the library's own diagnostics at `info`
pub fn init_tracing() {
    init_tracing_with(LogLevel::default());
}

/// Initialize tracing; `RUST_LOG` overrides `default_level` when set.
///
/// Hosts pass `config.shared.log_level` from their [`TraceConfig`].
///
/// [`TraceConfig`]: rtrace_common::config::TraceConfig
pub fn init_tracing_with(default_level: LogLevel) {
    use tracing_subscriber::fmt;

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(log_filter(directives.as_deref(), default_level))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Filter from `directives` if they parse, else from `default_level`
fn log_filter(directives: Option<&str>, default_level: LogLevel) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level.as_directive()))
}
