//! Bootstrap configuration loading and state folder resolution
//!
//! The TOML file only carries bootstrap concerns (addresses, folders,
//! logging). Runtime state such as the bridge's channel map lives in the
//! bridge's own JSON store.
//!
//! A missing or unreadable TOML file never stops startup: a warning is
//! logged and compiled defaults are used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "MIDIMACHINE_CONFIG";

/// Environment variable overriding the bridge state folder
pub const STATE_DIR_ENV_VAR: &str = "MIDIMACHINE_STATE_DIR";

/// Default relay port
pub const DEFAULT_RELAY_PORT: u16 = 5810;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Events buffered per SSE subscriber before it is considered lagging
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Bridge client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the relay
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Folder for the channel map store and presets
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Client name registered with the MIDI subsystem
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            state_dir: None,
            client_name: default_client_name(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_event_capacity() -> usize {
    256
}

fn default_relay_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_RELAY_PORT)
}

fn default_client_name() -> String {
    "MIDImachine".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the TOML config file
///
/// Priority: explicit path → `MIDIMACHINE_CONFIG` → platform config dir
/// (`~/.config/midimachine/config.toml` on Linux).
pub fn config_file_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|d| d.join("midimachine").join("config.toml"))
}

/// Parse a TOML config file, failing on any error
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the bootstrap config with graceful degradation
///
/// Missing file → debug log + defaults. Unreadable or malformed file →
/// warning + defaults.
pub fn load_toml_config(cli_arg: Option<&Path>) -> TomlConfig {
    let Some(path) = config_file_path(cli_arg) else {
        warn!("Could not determine config directory, using defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(mut config) => {
            debug!("Loaded config from {}", path.display());
            if config.relay.event_capacity == 0 {
                warn!(
                    "[relay] event_capacity must be at least 1; using {}",
                    default_event_capacity()
                );
                config.relay.event_capacity = default_event_capacity();
            }
            config
        }
        Err(e) => {
            warn!("{}; using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    write_atomic(path, content.as_bytes())
}

/// Write bytes to `path` via a sibling temp file and rename
///
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, bytes)?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// State folder resolution
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `MIDIMACHINE_STATE_DIR` environment variable
/// 3. `[bridge] state_dir` in the TOML config
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_state_dir(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(STATE_DIR_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.bridge.state_dir {
        return path.clone();
    }

    default_state_dir()
}

/// OS-dependent default state folder
pub fn default_state_dir() -> PathBuf {
    // ~/.local/share/midimachine, ~/Library/Application Support/midimachine,
    // %LOCALAPPDATA%\midimachine
    dirs::data_local_dir()
        .map(|d| d.join("midimachine"))
        .unwrap_or_else(|| PathBuf::from("./midimachine_data"))
}
