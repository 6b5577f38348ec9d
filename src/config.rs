//! Configuration types for kvstore.
//!
//! This module provides configuration structs for loading and validating
//! store settings from TOML files. It includes:
//!
//! - [`StoreConfig`] - Root configuration struct
//! - [`BackendConfig`] - Which backend to open
//! - [`KeysConfig`] - Key enumeration paging
//! - [`SweeperConfig`] - Background expiry sweeping
//! - [`LoggingConfig`] - Log level and format
//!
//! All configuration types support serde deserialization and provide
//! sensible defaults suitable for development use.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of keys fetched from the backend per enumeration page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Default capacity of the key channel handed to enumeration consumers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Page sizes above this trigger a validation warning.
const LARGE_PAGE_SIZE: usize = 10_000;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// kvstore.toml configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub keys: KeysConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

/// Backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Non-persistent DashMap store.
    #[default]
    Memory,
    /// Persistent redb file.
    Redb { path: PathBuf },
}

/// Paging for key enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Background expiry sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl SweeperConfig {
    /// The sweep interval, or `None` when sweeping is disabled.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_millis(self.interval_ms))
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

impl StoreConfig {
    /// Load configuration from kvstore.toml in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if kvstore.toml cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from("kvstore.toml")
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML or does not match
    /// the configuration schema.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid kvstore configuration")
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `keys.page_size` or `keys.channel_capacity` is zero
    /// - The sweeper is enabled with a zero interval
    /// - The redb path is empty
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if self.keys.page_size == 0 {
            bail!("keys.page_size must be greater than 0");
        }
        if self.keys.channel_capacity == 0 {
            bail!("keys.channel_capacity must be greater than 0");
        }
        if self.keys.page_size > LARGE_PAGE_SIZE {
            result.warnings.push(format!(
                "keys.page_size = {} holds a read transaction open for a long time; \
                 consider {} or less",
                self.keys.page_size, LARGE_PAGE_SIZE
            ));
        }

        if self.sweeper.enabled && self.sweeper.interval_ms == 0 {
            bail!("sweeper.interval_ms must be greater than 0 when the sweeper is enabled");
        }

        if let BackendConfig::Redb { path } = &self.backend {
            if path.as_os_str().is_empty() {
                bail!("backend.path must not be empty for the redb backend");
            }
            if path.is_relative() {
                result.warnings.push(format!(
                    "backend.path '{}' is relative and depends on the working directory",
                    path.display()
                ));
            }
            if self.sweeper.enabled && self.sweeper.interval_ms < 1000 {
                result.warnings.push(format!(
                    "sweeper.interval_ms = {} runs a write transaction more than once per second",
                    self.sweeper.interval_ms
                ));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.keys, KeysConfig::default());
        assert_eq!(config.sweeper.interval(), None);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.validate().unwrap().has_warnings());
    }

    #[test]
    fn test_full_config() {
        let config = StoreConfig::from_toml_str(
            r#"
            [backend]
            kind = "redb"
            path = "/var/lib/kv/store.redb"

            [keys]
            page_size = 32

            [sweeper]
            enabled = true
            interval_ms = 5000

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Redb {
                path: PathBuf::from("/var/lib/kv/store.redb")
            }
        );
        assert_eq!(config.keys.page_size, 32);
        assert_eq!(config.keys.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.sweeper.interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.validate().unwrap().has_warnings());
    }

    #[test]
    fn test_redb_requires_path() {
        let result = StoreConfig::from_toml_str("[backend]\nkind = \"redb\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = StoreConfig::from_toml_str("[backend]\nkind = \"etcd\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = StoreConfig::default();
        config.keys.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.keys.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.sweeper = SweeperConfig {
            enabled: true,
            interval_ms: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warnings() {
        let config = StoreConfig {
            backend: BackendConfig::Redb {
                path: PathBuf::from("data/kv.redb"),
            },
            keys: KeysConfig {
                page_size: 50_000,
                channel_capacity: 8,
            },
            sweeper: SweeperConfig {
                enabled: true,
                interval_ms: 100,
            },
            logging: LoggingConfig::default(),
        };

        let result = config.validate().unwrap();
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[keys]\nchannel_capacity = 4").unwrap();

        let config = StoreConfig::load_from(file.path()).unwrap();
        assert_eq!(config.keys.channel_capacity, 4);
    }

    #[test]
    fn test_load_missing_file_mentions_path() {
        let err = StoreConfig::load_from("/definitely/not/here.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.toml"));
    }
}
