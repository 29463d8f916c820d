//! Relay wire events and the EventBus
//!
//! Every message exchanged between the bridge, the relay and viewers is a
//! [`RelayEvent`]. Events serialize as flat JSON objects tagged by `"type"`,
//! e.g. `{"type":"midi:update","deviceName":"Korg 1","channel":3,"cc":74,"value":100}`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Error, MidiChannel, Result};

/// Highest value of a 7-bit MIDI data byte
pub const DATA_MAX: u8 = 127;

/// One Control-Change value as seen on a device port
///
/// This is the inbound event shape: `{ deviceName, channel, cc, value }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcMessage {
    /// Port name reported by the MIDI subsystem
    pub device_name: String,
    /// Channel the message was sent on (1-16)
    pub channel: MidiChannel,
    /// Controller number (0-127)
    pub cc: u8,
    /// Controller value (0-127)
    pub value: u8,
}

impl CcMessage {
    pub fn new(device_name: impl Into<String>, channel: MidiChannel, cc: u8, value: u8) -> Self {
        Self {
            device_name: device_name.into(),
            channel,
            cc,
            value,
        }
    }

    /// Check the data bytes are 7-bit and the device is named
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(Error::InvalidInput("deviceName is empty".to_string()));
        }
        if self.cc > DATA_MAX {
            return Err(Error::InvalidInput(format!("cc {} out of range 0-127", self.cc)));
        }
        if self.value > DATA_MAX {
            return Err(Error::InvalidInput(format!(
                "value {} out of range 0-127",
                self.value
            )));
        }
        Ok(())
    }

    /// Key identifying the (device, channel) pairing: `<deviceName>_ch<channel>`
    pub fn source_key(&self) -> String {
        source_key(&self.device_name, self.channel)
    }
}

/// Build the `<deviceName>_ch<channel>` key used for Sources and the value table
pub fn source_key(device_name: &str, channel: MidiChannel) -> String {
    format!("{}_ch{}", device_name, channel)
}

/// A device moved to a different channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub device_name: String,
    pub channel: MidiChannel,
    /// Identifier of the client that made the change
    ///
    /// The relay uses it to avoid echoing `midi:channel:updated` back to
    /// the originator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Last-seen value for one (device, channel, cc) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueEntry {
    pub device_name: String,
    pub channel: MidiChannel,
    pub cc: u8,
    pub value: u8,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Full value table, sent to a subscriber when it connects
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub values: Vec<ValueEntry>,
}

/// Relay wire events
///
/// Client→server: `midi:client:message`, `midi:channel:update`, `midi:ping`.
/// Server→clients: `midi:update`, `midi:channel:updated`, `midi:snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    /// Raw CC value captured by a client
    #[serde(rename = "midi:client:message")]
    ClientMessage(CcMessage),

    /// CC value broadcast to every subscriber
    #[serde(rename = "midi:update")]
    Update(CcMessage),

    /// Client moved a device to another channel
    #[serde(rename = "midi:channel:update")]
    ChannelUpdate(ChannelUpdate),

    /// Channel move broadcast to the other subscribers
    #[serde(rename = "midi:channel:updated")]
    ChannelUpdated(ChannelUpdate),

    /// Test ping from a client
    #[serde(rename = "midi:ping")]
    Ping(CcMessage),

    /// Current value table
    #[serde(rename = "midi:snapshot")]
    Snapshot(Snapshot),
}

impl RelayEvent {
    /// Wire name of the event, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            RelayEvent::ClientMessage(_) => "midi:client:message",
            RelayEvent::Update(_) => "midi:update",
            RelayEvent::ChannelUpdate(_) => "midi:channel:update",
            RelayEvent::ChannelUpdated(_) => "midi:channel:updated",
            RelayEvent::Ping(_) => "midi:ping",
            RelayEvent::Snapshot(_) => "midi:snapshot",
        }
    }

    /// True for events the relay sends to subscribers
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            RelayEvent::Update(_) | RelayEvent::ChannelUpdated(_) | RelayEvent::Snapshot(_)
        )
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central distribution bus for relay events
///
/// Uses tokio::broadcast internally: publishing never blocks, slow
/// subscribers observe a lag error and skip ahead.
///
/// # Examples
///
/// ```
/// use mm_common::events::{CcMessage, EventBus, RelayEvent};
/// use mm_common::MidiChannel;
///
/// let bus = EventBus::new(64);
/// let mut rx = bus.subscribe();
///
/// let ch = MidiChannel::new(3).unwrap();
/// bus.emit(RelayEvent::Update(CcMessage::new("Korg 1", ch, 74, 100))).ok();
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RelayEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<RelayEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RelayEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
