//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for processes that host a trace registry, and for the control tool.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rtrace_common::config::{ConfigLoader, TraceConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = TraceConfig::load(Path::new("rtrace.toml"))?;
//!     config.validate()?;
//!     println!("Store: {}", config.store.path.display());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_REMOTE_PORT, DEFAULT_RING_CAPACITY, DEFAULT_STORE_PATH, DEFAULT_STORE_PREFIX,
    RING_MAX_CAPACITY, RING_MIN_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared by every rtrace process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "player"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ring store placement and size.
///
/// The backing file is `<path>/<prefix>.<pid>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the backing file.
    pub path: PathBuf,
    /// File name prefix.
    pub prefix: String,
    /// Ring data capacity in bytes.
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            prefix: DEFAULT_STORE_PREFIX.to_string(),
            capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Validate prefix and capacity bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "store prefix '{}' must be a non-empty file name",
                self.prefix
            )));
        }
        if !(RING_MIN_CAPACITY..=RING_MAX_CAPACITY).contains(&self.capacity) {
            return Err(ConfigError::ValidationError(format!(
                "store capacity {} outside {RING_MIN_CAPACITY}..={RING_MAX_CAPACITY}",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Backing file path for a given process id.
    pub fn file_for(&self, pid: u32) -> PathBuf {
        store_file(&self.path, &self.prefix, pid)
    }
}

/// Builds `<dir>/<prefix>.<pid>`.
pub fn store_file(dir: &Path, prefix: &str, pid: u32) -> PathBuf {
    dir.join(format!("{prefix}.{pid}"))
}

/// Remote channel socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Local address the command socket binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Fixed destination for mirrored trace lines.
    ///
    /// When absent, lines go to the peer that last sent a command.
    #[serde(default)]
    pub mirror: Option<SocketAddr>,
}

fn default_bind() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_REMOTE_PORT))
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            mirror: None,
        }
    }
}

/// Default category rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultsConfig {
    /// JSON file holding an array of `{module, category, enabled}` rules.
    #[serde(default)]
    pub categories: Option<PathBuf>,
}

/// Full configuration of a process hosting a trace registry.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "player"
///
/// [store]
/// path = "/tmp/rtrace"
/// capacity = 65536
///
/// [remote]
/// bind = "127.0.0.1:5555"
///
/// [defaults]
/// categories = "/etc/rtrace/categories.json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Ring store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Remote channel; absent disables it.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Default category rules.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl TraceConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.store.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: TestWrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
            assert_eq!(level.as_directive(), text);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_store_defaults_are_valid() {
        let store = StoreConfig::default();
        assert!(store.validate().is_ok());
        assert_eq!(
            store.file_for(1234),
            PathBuf::from(DEFAULT_STORE_PATH).join("tracebuffer.1234")
        );
    }

    #[test]
    fn test_store_validation_rejects_bad_values() {
        let bad_prefix = StoreConfig {
            prefix: "a/b".into(),
            ..StoreConfig::default()
        };
        assert!(bad_prefix.validate().is_err());

        let tiny = StoreConfig {
            capacity: RING_MIN_CAPACITY - 1,
            ..StoreConfig::default()
        };
        assert!(tiny.validate().is_err());

        let huge = StoreConfig {
            capacity: RING_MAX_CAPACITY + 1,
            ..StoreConfig::default()
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = TraceConfig::load(Path::new("/nonexistent/path/rtrace.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = TraceConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_minimal_trace_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
service_name = "player"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = TraceConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.store, StoreConfig::default());
        assert!(config.remote.is_none());
        assert!(config.defaults.categories.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_trace_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "player"

[store]
path = "/var/run/rtrace"
prefix = "player"
capacity = 4096

[remote]
bind = "0.0.0.0:6000"
mirror = "10.0.0.2:6001"

[defaults]
categories = "/etc/rtrace/categories.json"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = TraceConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.store.capacity, 4096);
        assert_eq!(
            config.store.file_for(7),
            PathBuf::from("/var/run/rtrace/player.7")
        );
        let remote = config.remote.unwrap();
        assert_eq!(remote.bind, "0.0.0.0:6000".parse().unwrap());
        assert_eq!(remote.mirror, Some("10.0.0.2:6001".parse().unwrap()));
        assert_eq!(
            config.defaults.categories,
            Some(PathBuf::from("/etc/rtrace/categories.json"))
        );
    }

    #[test]
    fn test_remote_section_defaults_bind() {
        let config: TraceConfig = toml::from_str(
            r#"[shared]
service_name = "x"

[remote]
"#,
        )
        .unwrap();
        assert_eq!(config.remote, Some(RemoteConfig::default()));
    }
}
