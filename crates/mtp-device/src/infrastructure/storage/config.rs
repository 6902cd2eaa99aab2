//! TOML-based configuration for device connections.
//!
//! Reads and writes [`DeviceConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\MtpDirect\config.toml`
//! - Linux:    `~/.config/mtpdirect/config.toml`
//! - macOS:    `~/Library/Application Support/MtpDirect/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [transfer]
//! timeout_ms = 2000
//! separate_header = false
//!
//! [recovery]
//! reset_backoff_ms = 1000
//!
//! [debug]
//! usb = false
//! mtp = true
//! data = false
//! ```
//!
//! # Serde default values
//!
//! Every field falls back to its `default_*` function when absent, so an
//! empty file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Settings applied to every
/// [`DeviceConnection`](crate::application::connection::DeviceConnection).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub debug: DebugFlags,
}

/// Bulk transfer behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    /// Upper bound on every USB call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Send the 12-byte DATA header as its own transfer.  Some devices
    /// mis-parse a header that shares a packet with payload.
    #[serde(default)]
    pub separate_header: bool,
}

/// Recovery used by `configure` when a session cannot be opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Pause between resetting the device and reopening it, in milliseconds.
    #[serde(default = "default_reset_backoff_ms")]
    pub reset_backoff_ms: u64,
}

/// Per-connection trace switches.
///
/// Each flag enables one `tracing` target:
/// - `usb`:  `mtp::usb`, handle and interface lifecycle.
/// - `mtp`:  `mtp::mtp`, requests, responses and packet bookkeeping.
/// - `data`: `mtp::data`, hex dumps of every bulk transfer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugFlags {
    #[serde(default)]
    pub usb: bool,
    #[serde(default)]
    pub mtp: bool,
    #[serde(default)]
    pub data: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_timeout_ms() -> u64 {
    2000
}
fn default_reset_backoff_ms() -> u64 {
    1000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            separate_header: false,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reset_backoff_ms: default_reset_backoff_ms(),
        }
    }
}

impl TransferConfig {
    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RecoveryConfig {
    /// The reset backoff as a [`Duration`].
    pub fn reset_backoff(&self) -> Duration {
        Duration::from_millis(self.reset_backoff_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`DeviceConfig`] from the platform config file, returning defaults
/// if the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<DeviceConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`DeviceConfig`] from `path`, returning defaults if it is absent.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<DeviceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &DeviceConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `MtpDirect` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MtpDirect"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mtpdirect"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MtpDirect")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("mtp_config_test_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_device_config_default_values() {
        // Arrange / Act
        let cfg = DeviceConfig::default();

        // Assert
        assert_eq!(cfg.transfer.timeout_ms, 2000);
        assert!(!cfg.transfer.separate_header);
        assert_eq!(cfg.recovery.reset_backoff_ms, 1000);
        assert_eq!(cfg.debug, DebugFlags::default());
    }

    #[test]
    fn test_durations_follow_millisecond_fields() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.transfer.timeout(), Duration::from_secs(2));
        assert_eq!(cfg.recovery.reset_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: DeviceConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, DeviceConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[transfer]
separate_header = true

[debug]
mtp = true
"#;

        // Act
        let cfg: DeviceConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert!(cfg.transfer.separate_header);
        assert_eq!(cfg.transfer.timeout_ms, 2000);
        assert!(cfg.debug.mtp);
        assert!(!cfg.debug.usb);
        assert_eq!(cfg.recovery.reset_backoff_ms, 1000);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");
        let cfg = load_config_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, DeviceConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange – nested directory must be created on save
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = DeviceConfig::default();
        cfg.transfer.timeout_ms = 5000;
        cfg.recovery.reset_backoff_ms = 250;
        cfg.debug.data = true;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI env is also acceptable.
    }
}
