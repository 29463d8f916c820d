//! CC presets
//!
//! A preset is a JSON file in `<state_dir>/presets/<name>.json`:
//! `{ "cc": { "74": 100, "71": 20 }, "channel": 1, "program": 5 }`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mm_common::config::write_atomic;
use mm_common::events::DATA_MAX;
use mm_common::MidiChannel;

use crate::midi::{cc_name, ChannelMessage, MidiSink};
use crate::{Error, Result};

/// Pause between messages when applying a preset
pub const APPLY_INTERVAL: Duration = Duration::from_millis(10);

/// Saved controller values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub cc: BTreeMap<u8, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<MidiChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<u8>,
}

impl Preset {
    pub fn validate(&self) -> Result<()> {
        if let Some((cc, value)) = self
            .cc
            .iter()
            .find(|(cc, value)| **cc > DATA_MAX || **value > DATA_MAX)
        {
            return Err(Error::Preset(format!("CC{} = {} out of range 0-127", cc, value)));
        }
        if let Some(program) = self.program.filter(|p| *p > DATA_MAX) {
            return Err(Error::Preset(format!("program {} out of range 0-127", program)));
        }
        Ok(())
    }
}

/// Preset files in one directory
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<state_dir>/presets`
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("presets"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(|c: char| c == '/' || c == '\\' || c.is_control());
        if !valid {
            return Err(Error::Preset(format!("invalid preset name {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    pub fn save(&self, name: &str, preset: &Preset) -> Result<PathBuf> {
        preset.validate()?;
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(preset)?;
        write_atomic(&path, json.as_bytes())?;
        info!("Saved preset {} to {}", name, path.display());
        Ok(path)
    }

    /// Load a preset; `Ok(None)` when no such preset exists
    pub fn load(&self, name: &str) -> Result<Option<Preset>> {
        let path = self.path_for(name)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let preset: Preset = serde_json::from_str(&text)
            .map_err(|e| Error::Preset(format!("{}: {}", path.display(), e)))?;
        preset.validate()?;
        Ok(Some(preset))
    }

    /// Preset names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Send a preset's CC values, then its program change
///
/// Returns the number of messages sent.
pub async fn apply_preset(
    sink: &mut dyn MidiSink,
    channel: MidiChannel,
    preset: &Preset,
) -> Result<usize> {
    let mut sent = 0;

    for (&cc, &value) in &preset.cc {
        sink.send_cc(channel, cc, value)?;
        debug!("{} = {}", cc_name(cc), value);
        sent += 1;
        tokio::time::sleep(APPLY_INTERVAL).await;
    }

    if let Some(program) = preset.program {
        sink.send_message(&ChannelMessage::ProgramChange { channel, program })?;
        debug!("Program = {}", program);
        sent += 1;
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::CaptureSink;
    use tempfile::TempDir;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    fn sample() -> Preset {
        Preset {
            cc: BTreeMap::from([(74, 100), (71, 20)]),
            channel: Some(ch(2)),
            program: Some(5),
        }
    }

    #[test]
    fn test_json_shape_uses_string_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["cc"]["74"], 100);
        assert_eq!(json["channel"], 2);
        assert_eq!(json["program"], 5);

        let parsed: Preset = serde_json::from_str(r#"{"cc":{"7":90}}"#).unwrap();
        assert_eq!(parsed.cc[&7], 90);
        assert_eq!(parsed.channel, None);
    }

    #[test]
    fn test_save_load_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = PresetStore::in_state_dir(temp_dir.path());

        assert!(store.list().unwrap().is_empty());
        store.save("pad", &sample()).unwrap();
        store.save("bass", &Preset::default()).unwrap();

        assert_eq!(store.list().unwrap(), vec!["bass", "pad"]);
        assert_eq!(store.load("pad").unwrap(), Some(sample()));
        assert_eq!(store.load("missing").unwrap(), None);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let store = PresetStore::new("/tmp/unused");
        assert!(store.save("../escape", &sample()).is_err());
        assert!(store.save("", &sample()).is_err());
        assert!(store.load(".hidden").is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = PresetStore::new(temp_dir.path());
        std::fs::write(temp_dir.path().join("loud.json"), r#"{"cc":{"7":200}}"#).unwrap();

        assert!(matches!(store.load("loud"), Err(Error::Preset(_))));
    }

    #[tokio::test]
    async fn test_apply_sends_cc_then_program() {
        let mut sink = CaptureSink::new();
        let sent = apply_preset(&mut sink, ch(1), &sample()).await.unwrap();

        assert_eq!(sent, 3);
        assert_eq!(
            sink.sent(),
            &[vec![0xB0, 71, 20], vec![0xB0, 74, 100], vec![0xC0, 5]]
        );
    }
}
