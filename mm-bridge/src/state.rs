//! Bridge state reducer
//!
//! [`BridgeState`] owns the Source list and the persisted [`Config`].
//! Every mutation goes through [`BridgeState::apply`], which returns the
//! side effects the caller must carry out (persisting, relay emission).
//! The reducer itself performs no I/O.

use tracing::{debug, info};

use mm_common::events::CcMessage;
use mm_common::MidiChannel;

use crate::sources::{base_name, conflict_summary, next_available_channel, ConflictSummary, Source};
use crate::store::Config;

/// User or hardware input to the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// CC value arrived from a device port
    ControlChange(CcMessage),
    /// Move a Source to a channel
    SetChannel { id: String, channel: MidiChannel },
    /// Move a Source to the first free channel
    AutoAssign { id: String },
    /// Change the display label; an empty label restores the port name
    Rename { id: String, label: String },
    Remove { id: String },
    /// Drop every Source of a hardware base name and its remembered settings
    ForgetDevice { base: String },
    /// Toggle forwarding of CC values to the relay
    SetForwarding(bool),
}

/// Work requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist [`BridgeState::config`]
    SaveConfig,
    /// Tell the relay a device moved
    EmitChannelUpdate {
        device_name: String,
        channel: MidiChannel,
    },
    /// Forward a CC value to the relay, on the Source's assigned channel
    ForwardValue(CcMessage),
    /// The set of channel conflicts changed
    ConflictsChanged(ConflictSummary),
}

/// Source list plus persisted settings
#[derive(Debug, Clone, Default)]
pub struct BridgeState {
    sources: Vec<Source>,
    config: Config,
    summary: Option<ConflictSummary>,
}

impl BridgeState {
    pub fn new(config: Config) -> Self {
        Self {
            sources: Vec::new(),
            config,
            summary: None,
        }
    }

    /// Sources in creation order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn conflicts(&self) -> ConflictSummary {
        conflict_summary(&self.sources)
    }

    /// Apply one action, returning the effects to carry out in order
    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        let mut effects = match action {
            Action::ControlChange(msg) => self.control_change(msg),
            Action::SetChannel { id, channel } => self.set_channel(&id, channel),
            Action::AutoAssign { id } => self.auto_assign(&id),
            Action::Rename { id, label } => self.rename(&id, &label),
            Action::Remove { id } => self.remove(&id),
            Action::ForgetDevice { base } => self.forget_device(&base),
            Action::SetForwarding(enabled) => self.set_forwarding(enabled),
        };

        if let Some(summary) = self.refresh_conflicts() {
            effects.push(Effect::ConflictsChanged(summary));
        }
        effects
    }

    fn control_change(&mut self, msg: CcMessage) -> Vec<Effect> {
        if let Err(e) = msg.validate() {
            debug!("Ignoring CC from {:?}: {}", msg.device_name, e);
            return Vec::new();
        }

        let mut effects = Vec::new();
        let id = msg.source_key();

        let index = match self.sources.iter().position(|s| s.id == id) {
            Some(index) => index,
            None => {
                let source = self.create_source(&msg);
                info!(
                    "New source {} ({}) on channel {}",
                    source.id, source.label, source.channel
                );
                self.sources.push(source);
                effects.push(Effect::SaveConfig);
                self.sources.len() - 1
            }
        };

        let source = &mut self.sources[index];
        source.values.insert(msg.cc, msg.value);

        if self.config.udp_enabled {
            effects.push(Effect::ForwardValue(CcMessage::new(
                source.device_name.clone(),
                source.channel,
                msg.cc,
                msg.value,
            )));
        }
        effects
    }

    /// New Source for an unseen (device, channel) pair
    ///
    /// A remembered channel for the device's base name wins over the reported
    /// channel, without collision checks.
    fn create_source(&self, msg: &CcMessage) -> Source {
        let base = base_name(&msg.device_name);
        let mut source = Source::new(msg.device_name.clone(), msg.channel);

        if let Some(&channel) = self.config.channel_map.get(&base) {
            source = source.with_channel(channel);
        }
        if let Some(label) = self.config.renames.get(&base) {
            source = source.with_label(label.clone());
        }
        source
    }

    fn set_channel(&mut self, id: &str, channel: MidiChannel) -> Vec<Effect> {
        let Some(source) = self.sources.iter_mut().find(|s| s.id == id) else {
            debug!("SetChannel for unknown source {}", id);
            return Vec::new();
        };

        if source.channel == channel {
            return Vec::new();
        }

        info!("{} moved from channel {} to {}", source.id, source.channel, channel);
        source.channel = channel;
        let device_name = source.device_name.clone();
        self.config.channel_map.insert(source.device_base(), channel);

        vec![
            Effect::SaveConfig,
            Effect::EmitChannelUpdate {
                device_name,
                channel,
            },
        ]
    }

    fn auto_assign(&mut self, id: &str) -> Vec<Effect> {
        let Some(current) = self.source(id).map(|s| s.channel) else {
            debug!("AutoAssign for unknown source {}", id);
            return Vec::new();
        };

        let others: Vec<Source> = self
            .sources
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        let target = next_available_channel(&others, current);

        self.set_channel(id, target)
    }

    fn rename(&mut self, id: &str, label: &str) -> Vec<Effect> {
        let Some(source) = self.sources.iter_mut().find(|s| s.id == id) else {
            debug!("Rename for unknown source {}", id);
            return Vec::new();
        };

        let label = label.trim();
        let base = source.device_base();
        if label.is_empty() {
            source.label = source.device_name.clone();
            self.config.renames.remove(&base);
        } else {
            source.label = label.to_string();
            self.config.renames.insert(base, label.to_string());
        }

        vec![Effect::SaveConfig]
    }

    fn remove(&mut self, id: &str) -> Vec<Effect> {
        let before = self.sources.len();
        self.sources.retain(|s| s.id != id);

        if self.sources.len() == before {
            return Vec::new();
        }
        info!("Removed source {}", id);
        vec![Effect::SaveConfig]
    }

    fn forget_device(&mut self, base: &str) -> Vec<Effect> {
        let base = base_name(base);
        let before = self.sources.len();
        self.sources.retain(|s| s.device_base() != base);

        let had_channel = self.config.channel_map.remove(&base).is_some();
        let had_rename = self.config.renames.remove(&base).is_some();

        let removed = before - self.sources.len();
        if removed == 0 && !had_channel && !had_rename {
            return Vec::new();
        }
        info!("Forgot device {:?} ({} source(s))", base, removed);
        vec![Effect::SaveConfig]
    }

    fn set_forwarding(&mut self, enabled: bool) -> Vec<Effect> {
        if self.config.udp_enabled == enabled {
            return Vec::new();
        }
        self.config.udp_enabled = enabled;
        info!("Relay forwarding {}", if enabled { "enabled" } else { "disabled" });
        vec![Effect::SaveConfig]
    }

    /// Recompute conflicts, returning the summary if it changed
    fn refresh_conflicts(&mut self) -> Option<ConflictSummary> {
        let summary = conflict_summary(&self.sources);
        let changed = match &self.summary {
            Some(previous) => previous.conflicts != summary.conflicts,
            None => summary.has_conflicts,
        };
        self.summary = Some(summary.clone());
        changed.then_some(summary)
    }
}
