//! MIDI output
//!
//! Everything the CLI sends goes through [`MidiSink`], so the sending code
//! runs unchanged against hardware ([`MidiOut`]) or a [`CaptureSink`].

use std::str::FromStr;

use midir::{MidiOutput, MidiOutputConnection};
use tracing::{debug, info};

use mm_common::MidiChannel;

use super::input::list_outputs;
use super::message::{self, ChannelMessage};
use crate::{Error, Result};

/// Destination for raw MIDI bytes
pub trait MidiSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Port or sink name for log output
    fn name(&self) -> &str;

    fn send_message(&mut self, msg: &ChannelMessage) -> Result<()> {
        self.send(&msg.to_bytes())
    }

    fn send_cc(&mut self, channel: MidiChannel, controller: u8, value: u8) -> Result<()> {
        self.send_message(&ChannelMessage::ControlChange {
            channel,
            controller,
            value,
        })
    }

    fn send_all(&mut self, msgs: &[ChannelMessage]) -> Result<()> {
        for msg in msgs {
            self.send_message(msg)?;
        }
        Ok(())
    }

    /// Send SysEx, adding F0/F7 framing where missing
    fn send_sysex(&mut self, data: Vec<u8>) -> Result<()> {
        self.send(&message::frame_sysex(data))
    }
}

/// How the user picked an output port: by index or by name fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    Index(usize),
    Name(String),
}

impl FromStr for PortSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidInput("empty port selector".to_string()));
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => PortSelector::Index(index),
            Err(_) => PortSelector::Name(s.to_string()),
        })
    }
}

impl Default for PortSelector {
    fn default() -> Self {
        PortSelector::Index(0)
    }
}

/// Hardware output connection
pub struct MidiOut {
    connection: MidiOutputConnection,
    name: String,
}

impl MidiOut {
    pub fn open(client_name: &str, selector: &PortSelector) -> Result<Self> {
        let ports = list_outputs(client_name)?;
        if ports.is_empty() {
            return Err(Error::Midi("no MIDI output devices found".to_string()));
        }

        let info = match selector {
            PortSelector::Index(index) => ports.get(*index).ok_or_else(|| {
                Error::Midi(format!(
                    "MIDI output {} not found (0-{} available)",
                    index,
                    ports.len() - 1
                ))
            })?,
            PortSelector::Name(name) => {
                let wanted = name.to_lowercase();
                ports
                    .iter()
                    .find(|p| p.name.to_lowercase().contains(&wanted))
                    .ok_or_else(|| {
                        Error::Midi(format!("no MIDI output device matching '{}'", name))
                    })?
            }
        };

        let midi_out = MidiOutput::new(client_name)?;
        let out_ports = midi_out.ports();
        let port = out_ports
            .get(info.index)
            .ok_or_else(|| Error::Midi(format!("output {} disappeared", info.name)))?;
        let connection = midi_out.connect(port, &format!("{}-out", client_name))?;

        info!("Opened MIDI output [{}] {}", info.index, info.name);
        Ok(Self {
            connection,
            name: info.name.clone(),
        })
    }

    pub fn close(self) {
        self.connection.close();
    }
}

impl MidiSink for MidiOut {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sink that records sent bytes instead of touching hardware
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    sent: Vec<Vec<u8>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn into_sent(self) -> Vec<Vec<u8>> {
        self.sent
    }
}

impl MidiSink for CaptureSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        debug!("capture: {:02X?}", bytes);
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "capture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_port_selector_parse() {
        assert_eq!("2".parse::<PortSelector>().unwrap(), PortSelector::Index(2));
        assert_eq!(
            "Launchkey".parse::<PortSelector>().unwrap(),
            PortSelector::Name("Launchkey".to_string())
        );
        assert!("  ".parse::<PortSelector>().is_err());
    }

    #[test]
    fn test_capture_sink_helpers() {
        let mut sink = CaptureSink::new();
        sink.send_cc(ch(2), 74, 100).unwrap();
        sink.send_all(&message::panic(ch(1))).unwrap();
        sink.send_sysex(vec![0x43, 0x10]).unwrap();

        assert_eq!(sink.sent()[0], vec![0xB1, 74, 100]);
        assert_eq!(sink.sent().len(), 5);
        assert_eq!(sink.sent()[4], vec![0xF0, 0x43, 0x10, 0xF7]);
    }
}
