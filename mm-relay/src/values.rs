//! Last-seen value table
//!
//! A cache of the most recent value per (device, channel, cc). Never
//! persisted; a restart starts empty.

use std::collections::BTreeMap;

use mm_common::events::{source_key, CcMessage, Snapshot, ValueEntry};
use mm_common::MidiChannel;

/// Last value per (source key, cc)
#[derive(Debug, Default)]
pub struct ValueTable {
    entries: BTreeMap<(String, u8), ValueEntry>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a CC value, replacing any previous value for the same triple
    pub fn record(&mut self, msg: &CcMessage) {
        let entry = ValueEntry {
            device_name: msg.device_name.clone(),
            channel: msg.channel,
            cc: msg.cc,
            value: msg.value,
            updated_at: chrono::Utc::now(),
        };
        self.entries.insert((msg.source_key(), msg.cc), entry);
    }

    /// Last value for one triple
    pub fn get(&self, device_name: &str, channel: MidiChannel, cc: u8) -> Option<&ValueEntry> {
        self.entries.get(&(source_key(device_name, channel), cc))
    }

    /// All values recorded for one source key, ordered by cc
    pub fn for_source(&self, key: &str) -> Vec<ValueEntry> {
        self.entries
            .iter()
            .filter(|((k, _), _)| k == key)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            values: self.entries.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_record_overwrites_same_triple() {
        let mut table = ValueTable::new();
        table.record(&CcMessage::new("Korg 1", ch(3), 74, 100));
        table.record(&CcMessage::new("Korg 1", ch(3), 74, 20));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Korg 1", ch(3), 74).unwrap().value, 20);
    }

    #[test]
    fn test_distinct_triples_kept_apart() {
        let mut table = ValueTable::new();
        table.record(&CcMessage::new("Korg 1", ch(3), 74, 100));
        table.record(&CcMessage::new("Korg 1", ch(3), 7, 50));
        table.record(&CcMessage::new("Korg 1", ch(4), 74, 1));
        table.record(&CcMessage::new("Korg 2", ch(3), 74, 2));

        assert_eq!(table.len(), 4);
        let korg = table.for_source("Korg 1_ch3");
        assert_eq!(korg.len(), 2);
        assert_eq!(korg[0].cc, 7);
        assert_eq!(korg[1].cc, 74);
    }

    #[test]
    fn test_snapshot_and_empty() {
        let mut table = ValueTable::new();
        assert!(table.is_empty());
        assert!(table.snapshot().values.is_empty());

        table.record(&CcMessage::new("Roland", ch(1), 1, 64));
        let snapshot = table.snapshot();
        assert_eq!(snapshot.values.len(), 1);
        assert_eq!(snapshot.values[0].device_name, "Roland");
        assert!(table.get("Roland", ch(2), 1).is_none());
    }
}
