//! MIDI channel numbering
//!
//! Channels are numbered 1-16 everywhere a human or the wire protocol sees
//! them. The status byte of a channel message carries the zero-based form in
//! its low nibble.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// A MIDI channel in the range 1..=16
///
/// Construction is validated, so any `MidiChannel` value is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MidiChannel(u8);

impl MidiChannel {
    /// Lowest channel number
    pub const MIN: u8 = 1;
    /// Highest channel number
    pub const MAX: u8 = 16;

    /// Create a channel from its 1-based number
    pub fn new(number: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&number).then_some(Self(number))
    }

    /// Channel encoded in the low nibble of a status byte (0-15)
    pub fn from_status(status: u8) -> Self {
        Self((status & 0x0F) + 1)
    }

    /// 1-based channel number
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based channel for building status bytes
    pub fn index(self) -> u8 {
        self.0 - 1
    }

    /// All sixteen channels in ascending order
    pub fn all() -> impl Iterator<Item = MidiChannel> {
        (Self::MIN..=Self::MAX).map(MidiChannel)
    }
}

impl Default for MidiChannel {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for MidiChannel {
    type Error = Error;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        MidiChannel::new(number).ok_or_else(|| {
            Error::InvalidInput(format!("MIDI channel {} out of range 1-16", number))
        })
    }
}

impl From<MidiChannel> for u8 {
    fn from(channel: MidiChannel) -> u8 {
        channel.0
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
