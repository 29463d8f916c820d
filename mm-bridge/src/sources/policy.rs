//! Channel assignment policy

use std::collections::BTreeSet;

use mm_common::MidiChannel;

use super::Source;

/// Pick a channel for a Source
///
/// Returns `preferred` when no Source uses it, otherwise the lowest unused
/// channel. When all sixteen are taken, `preferred` is returned anyway and the
/// collision is left to conflict detection.
pub fn next_available_channel(sources: &[Source], preferred: MidiChannel) -> MidiChannel {
    let used: BTreeSet<MidiChannel> = sources.iter().map(|s| s.channel).collect();

    if !used.contains(&preferred) {
        return preferred;
    }

    MidiChannel::all()
        .find(|c| !used.contains(c))
        .unwrap_or(preferred)
}

/// Whether the Source `exclude_id` could move to `channel` without a conflict
///
/// A channel is unavailable only when some other Source sits on it under a
/// different base name. An unknown `exclude_id` compares against the empty
/// base name.
pub fn is_channel_available(sources: &[Source], channel: MidiChannel, exclude_id: &str) -> bool {
    let own_base = sources
        .iter()
        .find(|s| s.id == exclude_id)
        .map(Source::base_name)
        .unwrap_or_default();

    !sources
        .iter()
        .filter(|s| s.id != exclude_id && s.channel == channel)
        .any(|s| s.base_name() != own_base)
}
