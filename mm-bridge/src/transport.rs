//! Relay emission
//!
//! The bridge talks to the relay through the [`Transport`] trait so the app
//! loop never depends on a concrete connection. [`HttpTransport`] posts
//! events to the relay's `/api/emit` endpoint from a background task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mm_common::events::{CcMessage, ChannelUpdate, RelayEvent};
use mm_common::MidiChannel;

use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const QUEUE_CAPACITY: usize = 256;

/// Connection to the relay
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Identifier the relay uses to avoid echoing events back to us
    fn client_id(&self) -> &str;

    /// Queue an event for delivery
    fn emit(&self, event: RelayEvent) -> Result<()>;
}

/// Tell the relay a device moved to `channel`
///
/// Emits only while the transport is connected. Returns whether a send was
/// attempted; delivery failures are logged.
pub fn send_channel_update(
    transport: &dyn Transport,
    device_name: &str,
    channel: MidiChannel,
) -> bool {
    if !transport.is_connected() {
        debug!("Not connected, channel update for {} not sent", device_name);
        return false;
    }

    let event = RelayEvent::ChannelUpdate(ChannelUpdate {
        device_name: device_name.to_string(),
        channel,
        client_id: Some(transport.client_id().to_string()),
    });
    if let Err(e) = transport.emit(event) {
        warn!("Failed to send channel update for {}: {}", device_name, e);
    }
    true
}

/// Send a test ping; same contract as [`send_channel_update`]
pub fn send_ping(transport: &dyn Transport, ping: CcMessage) -> bool {
    if !transport.is_connected() {
        return false;
    }
    if let Err(e) = transport.emit(RelayEvent::Ping(ping)) {
        warn!("Failed to send ping: {}", e);
    }
    true
}

/// Forward a captured CC value; same contract as [`send_channel_update`]
pub fn forward_value(transport: &dyn Transport, msg: CcMessage) -> bool {
    if !transport.is_connected() {
        return false;
    }
    if let Err(e) = transport.emit(RelayEvent::ClientMessage(msg)) {
        debug!("Failed to forward CC value: {}", e);
    }
    true
}

/// Transport posting events to a relay over HTTP
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
    client_id: String,
    connected: Arc<AtomicBool>,
    sender: Mutex<Option<mpsc::Sender<RelayEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("mm-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            client_id: uuid::Uuid::new_v4().to_string(),
            connected: Arc::new(AtomicBool::new(false)),
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the relay's health endpoint and start the delivery task
    pub async fn connect(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "relay health check returned {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(deliver(
            self.http_client.clone(),
            format!("{}/api/emit", self.base_url),
            rx,
            Arc::clone(&self.connected),
        ));

        self.stop_worker();
        *self.lock_sender()? = Some(tx);
        if let Ok(mut slot) = self.worker.lock() {
            *slot = Some(worker);
        }
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected to relay at {} as {}", self.base_url, self.client_id);
        Ok(())
    }

    /// Stop the delivery task; queued events are dropped
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        self.stop_worker();
        info!("Disconnected from relay");
    }

    /// Reconnect every `interval` while the relay is unreachable
    pub async fn maintain(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if self.is_connected() {
                continue;
            }
            if let Err(e) = self.connect().await {
                debug!("Relay still unreachable: {}", e);
            }
        }
    }

    fn stop_worker(&self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                handle.abort();
            }
        }
    }

    fn lock_sender(&self) -> Result<std::sync::MutexGuard<'_, Option<mpsc::Sender<RelayEvent>>>> {
        self.sender
            .lock()
            .map_err(|_| Error::Transport("sender lock poisoned".to_string()))
    }
}

impl Transport for HttpTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn emit(&self, event: RelayEvent) -> Result<()> {
        let sender = self.lock_sender()?;
        let Some(tx) = sender.as_ref() else {
            return Err(Error::Transport("not connected".to_string()));
        };
        tx.try_send(event)
            .map_err(|e| Error::Transport(format!("event queue: {}", e)))
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Delivery loop: post each queued event in order
///
/// A failed post marks the transport disconnected; the event is dropped.
async fn deliver(
    http_client: reqwest::Client,
    url: String,
    mut rx: mpsc::Receiver<RelayEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(event) = rx.recv().await {
        let result = http_client.post(&url).json(&event).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Delivered {}", event.event_type());
            }
            Ok(response) => {
                warn!("Relay rejected {}: {}", event.event_type(), response.status());
            }
            Err(e) => {
                warn!("Relay unreachable, dropping {}: {}", event.event_type(), e);
                connected.store(false, Ordering::SeqCst);
            }
        }
    }
    debug!("Relay delivery task stopped");
}

/// Transport that is never connected
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn client_id(&self) -> &str {
        "offline"
    }

    fn emit(&self, _event: RelayEvent) -> Result<()> {
        Err(Error::Transport("offline".to_string()))
    }
}

/// Transport that keeps every emitted event in memory
#[derive(Debug)]
pub struct RecordingTransport {
    connected: AtomicBool,
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingTransport {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Events emitted so far
    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn client_id(&self) -> &str {
        "recording"
    }

    fn emit(&self, event: RelayEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::Transport("recording lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_channel_update_skipped_when_disconnected() {
        let transport = RecordingTransport::new(false);
        assert!(!send_channel_update(&transport, "Korg", ch(3)));
        assert!(transport.events().is_empty());
    }

    #[test]
    fn test_channel_update_carries_client_id() {
        let transport = RecordingTransport::new(true);
        assert!(send_channel_update(&transport, "Korg", ch(3)));

        let events = transport.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RelayEvent::ChannelUpdate(update) => {
                assert_eq!(update.device_name, "Korg");
                assert_eq!(update.channel, ch(3));
                assert_eq!(update.client_id.as_deref(), Some("recording"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_ping_and_forward() {
        let transport = RecordingTransport::new(true);
        let ping = CcMessage::new("Korg", ch(1), 1, 64);

        assert!(send_ping(&transport, ping.clone()));
        assert!(forward_value(&transport, ping.clone()));
        assert_eq!(
            transport.events(),
            vec![RelayEvent::Ping(ping.clone()), RelayEvent::ClientMessage(ping)]
        );
    }

    #[test]
    fn test_null_transport_never_sends() {
        assert!(!send_channel_update(&NullTransport, "Korg", ch(1)));
        assert!(!send_ping(&NullTransport, CcMessage::new("Korg", ch(1), 0, 0)));
    }

    #[tokio::test]
    async fn test_http_transport_starts_disconnected() {
        let transport = HttpTransport::new("http://127.0.0.1:1/").unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:1");
        assert!(!transport.is_connected());
        assert!(transport.emit(RelayEvent::Ping(CcMessage::new("x", ch(1), 0, 0))).is_err());
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
    }
}
