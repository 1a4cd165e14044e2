//! TOML-based configuration persistence for the viewer.
//!
//! Reads and writes `ViewerConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\WindowMirror\viewer.toml`
//! - Linux:    `~/.config/window-mirror/viewer.toml`
//! - macOS:    `~/Library/Application Support/WindowMirror/viewer.toml`
//!
//! An explicit path (the `--config` flag) bypasses the platform lookup.
//!
//! ```toml
//! [network]
//! bind_address = "127.0.0.1"
//! port = 9999
//!
//! [viewer]
//! tick_rate_hz = 60
//! log_level = "info"
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so a partial file (or one
//! written by an older version) still loads.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "viewer.toml";

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

    /// `bind_address` is not an IP address.
    #[error("invalid bind address {value:?}: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level viewer configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub viewer: ViewerSettings,
}

/// Where the viewer listens for the streamer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to bind.  `"0.0.0.0"` accepts streamers from other hosts.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.  `0` picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Host-loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerSettings {
    /// How many times per second the dispatcher is drained.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_tick_rate_hz() -> u32 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            log_level: default_log_level(),
        }
    }
}

impl ViewerConfig {
    /// The address the connection manager binds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP
    /// literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr =
            self.network
                .bind_address
                .parse()
                .map_err(|source| ConfigError::InvalidAddress {
                    value: self.network.bind_address.clone(),
                    source,
                })?;
        Ok(SocketAddr::new(ip, self.network.port))
    }

    /// Period between dispatcher drains.  A rate of zero is treated as 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.viewer.tick_rate_hz.max(1)
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
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads the config from the platform location, or defaults if absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ViewerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ViewerConfig` from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ViewerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ViewerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &ViewerConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &ViewerConfig, path: &Path) -> Result<(), ConfigError> {
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

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("WindowMirror"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("window-mirror"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("WindowMirror")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
