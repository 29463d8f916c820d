//! Config Store
//!
//! Persists the bridge's remembered channel assignments, display renames and
//! the forwarding toggle as one JSON record under [`CONFIG_KEY`]. Loading
//! never fails: an absent or unreadable record yields [`Config::default`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mm_common::config::write_atomic;
use mm_common::MidiChannel;

use crate::{Error, Result};

/// Storage key of the persisted config record
pub const CONFIG_KEY: &str = "midimachine_config";

/// Persisted bridge settings, keyed by hardware base name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Remembered channel per base name
    pub channel_map: BTreeMap<String, MidiChannel>,
    /// Display name per base name
    pub renames: BTreeMap<String, String>,
    /// Forward CC values to the relay
    pub udp_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_map: BTreeMap::new(),
            renames: BTreeMap::new(),
            udp_enabled: true,
        }
    }
}

/// Key/value persistence backend
pub trait Storage: Send + Sync {
    /// Stored text for `key`, `Ok(None)` when absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key in a state directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`: `<dir>/<key>.json`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        write_atomic(&self.path_for(key), value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage with an optional byte quota
///
/// Used by tests and by `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes making the total exceed `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(Error::Storage(format!(
                    "quota of {} bytes exceeded",
                    quota
                )));
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Loads and saves the [`Config`] record
pub struct ConfigStore {
    storage: Box<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// File-backed store in `state_dir`
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self::new(FileStorage::new(state_dir))
    }

    /// Read the persisted config, falling back to defaults
    pub fn load_config(&self) -> Config {
        let text = match self.storage.get(CONFIG_KEY) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("No stored config, using defaults");
                return Config::default();
            }
            Err(e) => {
                warn!("Failed to read stored config: {}. Using defaults.", e);
                return Config::default();
            }
        };

        match serde_json::from_str::<Config>(&text) {
            Ok(config) => {
                debug!(
                    "Loaded config: {} channel(s), {} rename(s), forwarding {}",
                    config.channel_map.len(),
                    config.renames.len(),
                    config.udp_enabled
                );
                config
            }
            Err(e) => {
                warn!("Stored config is malformed: {}. Using defaults.", e);
                Config::default()
            }
        }
    }

    /// Persist the config; false when storage rejected the write
    pub fn save_config(&self, config: &Config) -> bool {
        let text = match serde_json::to_string_pretty(config) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode config: {}", e);
                return false;
            }
        };

        match self.storage.set(CONFIG_KEY, &text) {
            Ok(()) => {
                debug!("Config saved");
                true
            }
            Err(e) => {
                warn!("Failed to save config: {}", e);
                false
            }
        }
    }

    /// Delete the persisted record
    pub fn reset(&self) -> Result<()> {
        self.storage.remove(CONFIG_KEY)?;
        info!("Stored config cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    fn sample_config() -> Config {
        let mut config = Config::default();
        config.channel_map.insert("korg".to_string(), ch(7));
        config.renames.insert("korg".to_string(), "Lead".to_string());
        config.udp_enabled = false;
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.channel_map.is_empty());
        assert!(config.renames.is_empty());
        assert!(config.udp_enabled);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(sample_config()).unwrap();
        assert_eq!(json["channelMap"]["korg"], 7);
        assert_eq!(json["renames"]["korg"], "Lead");
        assert_eq!(json["udpEnabled"], false);
    }

    #[test]
    fn test_missing_fields_default() {
        let config: Config = serde_json::from_str(r#"{"channelMap":{"korg":2}}"#).unwrap();
        assert_eq!(config.channel_map["korg"], ch(2));
        assert!(config.renames.is_empty());
        assert!(config.udp_enabled);
    }

    #[test]
    fn test_load_absent_is_default() {
        let store = ConfigStore::new(MemoryStorage::new());
        assert_eq!(store.load_config(), Config::default());
    }

    #[test]
    fn test_load_corrupted_is_default() {
        let storage = MemoryStorage::new();
        storage.set(CONFIG_KEY, "{not json").unwrap();
        let store = ConfigStore::new(storage);
        assert_eq!(store.load_config(), Config::default());
    }

    #[test]
    fn test_load_out_of_range_channel_is_default() {
        let storage = MemoryStorage::new();
        storage
            .set(CONFIG_KEY, r#"{"channelMap":{"korg":42},"udpEnabled":false}"#)
            .unwrap();
        let store = ConfigStore::new(storage);
        assert_eq!(store.load_config(), Config::default());
    }

    #[test]
    fn test_save_then_load_memory() {
        let store = ConfigStore::new(MemoryStorage::new());
        assert!(store.save_config(&sample_config()));
        assert_eq!(store.load_config(), sample_config());
    }

    #[test]
    fn test_save_over_quota_returns_false() {
        let store = ConfigStore::new(MemoryStorage::with_quota(8));
        assert!(!store.save_config(&sample_config()));
        assert_eq!(store.load_config(), Config::default());
    }

    #[test]
    fn test_file_storage_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::in_dir(temp_dir.path());

        assert!(store.save_config(&sample_config()));
        assert!(temp_dir.path().join("midimachine_config.json").exists());
        assert_eq!(store.load_config(), sample_config());

        store.reset().unwrap();
        assert_eq!(store.load_config(), Config::default());
    }

    #[test]
    fn test_file_storage_creates_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        let store = ConfigStore::in_dir(&nested);

        assert!(store.save_config(&Config::default()));
        assert!(nested.join("midimachine_config.json").exists());
    }
}
