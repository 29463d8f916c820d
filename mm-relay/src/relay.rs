//! Relay core: ingest client events, update the value table, fan out
//!
//! Client→server events map to server→client broadcasts:
//! - `midi:client:message` → record value, broadcast `midi:update`
//! - `midi:ping`           → log, broadcast `midi:update` (table untouched)
//! - `midi:channel:update` → broadcast `midi:channel:updated`
//!
//! Malformed or out-of-range events are dropped without a response.

use tokio::sync::RwLock;
use tracing::{debug, info};

use mm_common::events::{EventBus, RelayEvent, Snapshot, ValueEntry};

use crate::values::ValueTable;

/// Shared relay state: the event bus and the last-value table
pub struct Relay {
    bus: EventBus,
    values: RwLock<ValueTable>,
}

impl Relay {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            bus: EventBus::new(event_capacity),
            values: RwLock::new(ValueTable::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Parse a raw request body and handle it
    ///
    /// Anything that does not decode as a client event is dropped.
    pub async fn ingest(&self, body: &[u8]) -> Option<RelayEvent> {
        match serde_json::from_slice::<RelayEvent>(body) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                debug!("Dropping malformed event: {}", e);
                None
            }
        }
    }

    /// Handle one client event, returning what was broadcast
    pub async fn handle(&self, event: RelayEvent) -> Option<RelayEvent> {
        let outbound = match event {
            RelayEvent::ClientMessage(msg) => {
                if let Err(e) = msg.validate() {
                    debug!("Dropping midi:client:message: {}", e);
                    return None;
                }
                self.values.write().await.record(&msg);
                RelayEvent::Update(msg)
            }
            RelayEvent::Ping(msg) => {
                if let Err(e) = msg.validate() {
                    debug!("Dropping midi:ping: {}", e);
                    return None;
                }
                info!(
                    "Ping from {} ch{} cc{}={}",
                    msg.device_name, msg.channel, msg.cc, msg.value
                );
                RelayEvent::Update(msg)
            }
            RelayEvent::ChannelUpdate(update) => {
                if update.device_name.trim().is_empty() {
                    debug!("Dropping midi:channel:update without deviceName");
                    return None;
                }
                info!("{} moved to channel {}", update.device_name, update.channel);
                RelayEvent::ChannelUpdated(update)
            }
            other => {
                debug!("Ignoring server-side event {} sent by a client", other.event_type());
                return None;
            }
        };

        self.bus.emit_lossy(outbound.clone());
        Some(outbound)
    }

    /// Current value table
    pub async fn snapshot(&self) -> Snapshot {
        self.values.read().await.snapshot()
    }

    /// Number of (device, channel, cc) values recorded
    pub async fn value_count(&self) -> usize {
        self.values.read().await.len()
    }

    /// Values recorded for one `<deviceName>_ch<channel>` key
    pub async fn values_for(&self, key: &str) -> Vec<ValueEntry> {
        self.values.read().await.for_source(key)
    }
}

/// Whether a broadcast event should be sent to a given subscriber
///
/// Channel moves are not echoed to the client that made them.
pub fn delivers_to(event: &RelayEvent, subscriber: Option<&str>) -> bool {
    match event {
        RelayEvent::Update(_) | RelayEvent::Snapshot(_) => true,
        RelayEvent::ChannelUpdated(update) => match (update.client_id.as_deref(), subscriber) {
            (Some(origin), Some(me)) => origin != me,
            _ => true,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_common::events::{CcMessage, ChannelUpdate};
    use mm_common::MidiChannel;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    fn channel_updated(client_id: Option<&str>) -> RelayEvent {
        RelayEvent::ChannelUpdated(ChannelUpdate {
            device_name: "Korg".to_string(),
            channel: ch(4),
            client_id: client_id.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_client_message_records_and_broadcasts() {
        let relay = Relay::new(16);
        let mut rx = relay.bus().subscribe();

        let msg = CcMessage::new("Korg 1", ch(3), 74, 100);
        let out = relay.handle(RelayEvent::ClientMessage(msg.clone())).await;

        assert_eq!(out, Some(RelayEvent::Update(msg.clone())));
        assert_eq!(rx.recv().await.unwrap(), RelayEvent::Update(msg));
        assert_eq!(relay.snapshot().await.values.len(), 1);
    }

    #[tokio::test]
    async fn test_ping_echoes_without_recording() {
        let relay = Relay::new(16);
        let msg = CcMessage::new("Test", ch(1), 1, 1);
        let out = relay.handle(RelayEvent::Ping(msg.clone())).await;

        assert_eq!(out, Some(RelayEvent::Update(msg)));
        assert!(relay.snapshot().await.values.is_empty());
    }

    #[tokio::test]
    async fn test_channel_update_becomes_updated() {
        let relay = Relay::new(16);
        let update = ChannelUpdate {
            device_name: "Roland".to_string(),
            channel: ch(9),
            client_id: Some("a".to_string()),
        };
        let out = relay.handle(RelayEvent::ChannelUpdate(update.clone())).await;
        assert_eq!(out, Some(RelayEvent::ChannelUpdated(update)));
    }

    #[tokio::test]
    async fn test_malformed_and_server_events_dropped() {
        let relay = Relay::new(16);
        assert!(relay.ingest(b"not json").await.is_none());
        assert!(relay
            .ingest(br#"{"type":"midi:client:message","deviceName":"A","channel":1}"#)
            .await
            .is_none());
        assert!(relay
            .ingest(br#"{"type":"midi:client:message","deviceName":"A","channel":1,"cc":200,"value":1}"#)
            .await
            .is_none());

        let msg = CcMessage::new("A", ch(1), 1, 1);
        assert!(relay.handle(RelayEvent::Update(msg)).await.is_none());
        assert!(relay.snapshot().await.values.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_valid_body() {
        let relay = Relay::new(16);
        let out = relay
            .ingest(br#"{"type":"midi:client:message","deviceName":"Korg 2","channel":3,"cc":7,"value":50}"#)
            .await;
        assert!(matches!(out, Some(RelayEvent::Update(ref m)) if m.cc == 7 && m.value == 50));
        assert_eq!(relay.values_for("Korg 2_ch3").await.len(), 1);
    }

    #[test]
    fn test_channel_updated_not_echoed_to_origin() {
        assert!(!delivers_to(&channel_updated(Some("a")), Some("a")));
        assert!(delivers_to(&channel_updated(Some("a")), Some("b")));
        assert!(delivers_to(&channel_updated(Some("a")), None));
        assert!(delivers_to(&channel_updated(None), Some("a")));
    }

    #[test]
    fn test_client_events_never_delivered() {
        let msg = CcMessage::new("A", ch(1), 1, 1);
        assert!(delivers_to(&RelayEvent::Update(msg.clone()), Some("a")));
        assert!(!delivers_to(&RelayEvent::ClientMessage(msg.clone()), None));
        assert!(!delivers_to(&RelayEvent::Ping(msg), None));
    }
}
