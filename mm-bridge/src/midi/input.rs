//! MIDI input capture
//!
//! Opens hardware input ports with midir and forwards every Control-Change
//! message into the app loop as a [`CcMessage`]. Failing to reach the MIDI
//! subsystem is not an error: [`MidiAccess::status`] reports it instead.

use std::fmt;

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mm_common::events::CcMessage;

use super::message::parse_cc;
use crate::Result;

/// One port as listed by the MIDI subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: usize,
    pub name: String,
}

/// Input ports visible to `client_name`
pub fn list_inputs(client_name: &str) -> Result<Vec<PortInfo>> {
    let midi_in = MidiInput::new(client_name)?;
    Ok(midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| PortInfo {
            index,
            name: midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
        })
        .collect())
}

/// Output ports visible to `client_name`
pub fn list_outputs(client_name: &str) -> Result<Vec<PortInfo>> {
    let midi_out = MidiOutput::new(client_name)?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| PortInfo {
            index,
            name: midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Device {}", index)),
        })
        .collect())
}

/// Outcome of opening the input ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiStatus {
    Connected(usize),
    NoDevices,
    Unavailable(String),
}

impl fmt::Display for MidiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiStatus::Connected(n) => write!(f, "connected to {} input(s)", n),
            MidiStatus::NoDevices => write!(f, "no MIDI inputs found"),
            MidiStatus::Unavailable(reason) => write!(f, "MIDI unavailable: {}", reason),
        }
    }
}

/// Open input connections; closing happens on drop
pub struct MidiAccess {
    connections: Vec<MidiInputConnection<()>>,
    port_names: Vec<String>,
    status: MidiStatus,
}

impl MidiAccess {
    /// Open every input port whose name contains `filter` (case-insensitive)
    ///
    /// CC messages are pushed into `tx`; when the channel is full they are
    /// dropped.
    pub fn open(client_name: &str, filter: Option<&str>, tx: mpsc::Sender<CcMessage>) -> Self {
        let ports = match list_inputs(client_name) {
            Ok(ports) => ports,
            Err(e) => {
                warn!("MIDI input unavailable: {}", e);
                return Self::unavailable(e.to_string());
            }
        };

        let filter = filter.map(str::to_lowercase);
        let selected: Vec<PortInfo> = ports
            .into_iter()
            .filter(|p| match &filter {
                Some(f) => p.name.to_lowercase().contains(f),
                None => true,
            })
            .collect();

        let mut connections = Vec::new();
        let mut port_names = Vec::new();
        let mut last_error = None;

        for port in selected {
            match connect_port(client_name, &port, tx.clone()) {
                Ok(connection) => {
                    info!("Listening on MIDI input [{}] {}", port.index, port.name);
                    connections.push(connection);
                    port_names.push(port.name);
                }
                Err(e) => {
                    warn!("Failed to open MIDI input {}: {}", port.name, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let status = match (connections.len(), last_error) {
            (0, Some(reason)) => MidiStatus::Unavailable(reason),
            (0, None) => MidiStatus::NoDevices,
            (n, _) => MidiStatus::Connected(n),
        };

        Self {
            connections,
            port_names,
            status,
        }
    }

    fn unavailable(reason: String) -> Self {
        Self {
            connections: Vec::new(),
            port_names: Vec::new(),
            status: MidiStatus::Unavailable(reason),
        }
    }

    /// Display string describing the input state
    pub fn status(&self) -> String {
        self.status.to_string()
    }

    pub fn midi_status(&self) -> &MidiStatus {
        &self.status
    }

    /// Names of the opened ports
    pub fn port_names(&self) -> &[String] {
        &self.port_names
    }

    /// Close every connection
    pub fn close(self) {
        for connection in self.connections {
            connection.close();
        }
        debug!("MIDI inputs closed");
    }
}

fn connect_port(
    client_name: &str,
    port: &PortInfo,
    tx: mpsc::Sender<CcMessage>,
) -> Result<MidiInputConnection<()>> {
    // midir consumes the MidiInput on connect, so each port gets its own
    let mut midi_in = MidiInput::new(client_name)?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    let handle = ports
        .get(port.index)
        .ok_or_else(|| crate::Error::Midi(format!("input {} disappeared", port.name)))?;

    let device_name = port.name.clone();
    let connection = midi_in.connect(
        handle,
        &format!("{}-in", client_name),
        move |_timestamp_us, data, _| {
            if let Some(msg) = parse_cc(&device_name, data) {
                if tx.try_send(msg).is_err() {
                    debug!("MIDI input queue full, dropping CC from {}", device_name);
                }
            }
        },
        (),
    )?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(MidiStatus::Connected(2).to_string(), "connected to 2 input(s)");
        assert_eq!(
            MidiStatus::Unavailable("access denied".to_string()).to_string(),
            "MIDI unavailable: access denied"
        );
        assert_eq!(MidiStatus::NoDevices.to_string(), "no MIDI inputs found");
    }
}
