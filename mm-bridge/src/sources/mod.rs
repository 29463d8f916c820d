//! Sources: the (device, channel) pairings visible to the user
//!
//! A Source is created the first time a CC message arrives for an unseen
//! `(deviceName, channel)` pair and is keyed by `<deviceName>_ch<channel>`
//! using the channel the hardware reported. Its assigned `channel` may later
//! differ from the reported one (remembered channel, user edits).

mod base_name;
mod conflicts;
mod policy;

pub use base_name::base_name;
pub use conflicts::{
    base_groups, conflict_summary, find_channel_conflicts, ChannelConflicts, ConflictSummary,
};
pub use policy::{is_channel_available, next_available_channel};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mm_common::events::source_key;
use mm_common::MidiChannel;

/// One logical (device, channel) pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable key, `<deviceName>_ch<reported channel>`
    pub id: String,
    /// Hardware port name, never renamed
    pub device_name: String,
    /// Display name, may be user-renamed
    pub label: String,
    /// Assigned channel
    pub channel: MidiChannel,
    /// Last value per controller number
    #[serde(default)]
    pub values: BTreeMap<u8, u8>,
}

impl Source {
    /// Source for a device port as first seen on `reported` channel
    pub fn new(device_name: impl Into<String>, reported: MidiChannel) -> Self {
        let device_name = device_name.into();
        Self {
            id: source_key(&device_name, reported),
            label: device_name.clone(),
            device_name,
            channel: reported,
            values: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_channel(mut self, channel: MidiChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Base name of the display label, used for conflict grouping
    pub fn base_name(&self) -> String {
        base_name(&self.label)
    }

    /// Base name of the hardware port, used as the config store key
    pub fn device_base(&self) -> String {
        base_name(&self.device_name)
    }
}
