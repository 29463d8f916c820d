//! Channel conflict detection
//!
//! A channel is in conflict when Sources of physically different instruments
//! share it. Ports of the same instrument (same base name) on one channel are
//! not a conflict.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use mm_common::MidiChannel;

use super::Source;

/// Conflicting channels and the Sources on each
pub type ChannelConflicts = BTreeMap<MidiChannel, Vec<Source>>;

/// Find every channel shared by Sources with differing base names
pub fn find_channel_conflicts(sources: &[Source]) -> ChannelConflicts {
    let mut by_channel: BTreeMap<MidiChannel, Vec<&Source>> = BTreeMap::new();
    for source in sources {
        by_channel.entry(source.channel).or_default().push(source);
    }

    by_channel
        .into_iter()
        .filter(|(_, group)| {
            let bases: BTreeSet<String> = group.iter().map(|s| s.base_name()).collect();
            bases.len() >= 2
        })
        .map(|(channel, group)| (channel, group.into_iter().cloned().collect()))
        .collect()
}

/// Overview of the current conflicts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictSummary {
    pub has_conflicts: bool,
    /// Number of colliding channels
    pub conflict_count: usize,
    /// Sources involved across all colliding channels
    pub device_count: usize,
    pub conflicts: ChannelConflicts,
}

/// Summarize [`find_channel_conflicts`]
pub fn conflict_summary(sources: &[Source]) -> ConflictSummary {
    let conflicts = find_channel_conflicts(sources);
    let device_count = conflicts.values().map(Vec::len).sum();

    ConflictSummary {
        has_conflicts: !conflicts.is_empty(),
        conflict_count: conflicts.len(),
        device_count,
        conflicts,
    }
}

/// Sources grouped by base name (ports of the same physical instrument)
pub fn base_groups(sources: &[Source]) -> BTreeMap<String, Vec<&Source>> {
    let mut groups: BTreeMap<String, Vec<&Source>> = BTreeMap::new();
    for source in sources {
        groups.entry(source.base_name()).or_default().push(source);
    }
    groups
}
