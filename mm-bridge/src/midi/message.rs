//! MIDI channel-voice messages
//!
//! Parsing of raw bytes from input ports and encoding of everything the
//! output tooling sends: CC, notes, program change, pitch bend, NRPN/RPN
//! sequences, panic and SysEx framing.

use mm_common::events::CcMessage;
use mm_common::MidiChannel;

use crate::{Error, Result};

/// Centre position of the 14-bit pitch wheel
pub const PITCH_BEND_CENTER: u16 = 8192;
/// Highest 14-bit value (pitch bend, NRPN/RPN data)
pub const MAX_14BIT: u16 = 16383;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Channel-voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOff {
        channel: MidiChannel,
        note: u8,
        velocity: u8,
    },
    NoteOn {
        channel: MidiChannel,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: MidiChannel,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: MidiChannel,
        program: u8,
    },
    /// 14-bit value, 8192 = centre
    PitchBend { channel: MidiChannel, value: u16 },
}

impl ChannelMessage {
    /// Parse one message; None for unsupported or truncated input
    ///
    /// Note On with velocity 0 is reported as Note Off.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        let channel = MidiChannel::from_status(status);
        let byte = |i: usize| rest.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(ChannelMessage::NoteOff {
                channel,
                note: byte(0)?,
                velocity: byte(1)?,
            }),
            0x90 => {
                let (note, velocity) = (byte(0)?, byte(1)?);
                if velocity == 0 {
                    Some(ChannelMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(ChannelMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => Some(ChannelMessage::ControlChange {
                channel,
                controller: byte(0)?,
                value: byte(1)?,
            }),
            0xC0 => Some(ChannelMessage::ProgramChange {
                channel,
                program: byte(0)?,
            }),
            0xE0 => {
                let (lsb, msb) = (byte(0)? as u16, byte(1)? as u16);
                Some(ChannelMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Wire bytes; data bytes are masked to 7 bits
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            ChannelMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | channel.index(), note & 0x7F, velocity & 0x7F],
            ChannelMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | channel.index(), note & 0x7F, velocity & 0x7F],
            ChannelMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | channel.index(), controller & 0x7F, value & 0x7F],
            ChannelMessage::ProgramChange { channel, program } => {
                vec![0xC0 | channel.index(), program & 0x7F]
            }
            ChannelMessage::PitchBend { channel, value } => {
                let value = value.min(MAX_14BIT);
                vec![
                    0xE0 | channel.index(),
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]
            }
        }
    }

    pub fn channel(&self) -> MidiChannel {
        match *self {
            ChannelMessage::NoteOff { channel, .. }
            | ChannelMessage::NoteOn { channel, .. }
            | ChannelMessage::ControlChange { channel, .. }
            | ChannelMessage::ProgramChange { channel, .. }
            | ChannelMessage::PitchBend { channel, .. } => channel,
        }
    }
}

/// Extract a CC event for `device_name` from raw input bytes
pub fn parse_cc(device_name: &str, data: &[u8]) -> Option<CcMessage> {
    match ChannelMessage::from_bytes(data)? {
        ChannelMessage::ControlChange {
            channel,
            controller,
            value,
        } => Some(CcMessage::new(device_name, channel, controller, value)),
        _ => None,
    }
}

fn cc(channel: MidiChannel, controller: u8, value: u8) -> ChannelMessage {
    ChannelMessage::ControlChange {
        channel,
        controller,
        value,
    }
}

/// Split a 14-bit value into (MSB, LSB)
fn split_14bit(value: u16) -> (u8, u8) {
    (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
}

/// NRPN write: CC 99/98 select the parameter, CC 6/38 carry the value
pub fn nrpn(channel: MidiChannel, param: u16, value: u16) -> [ChannelMessage; 4] {
    let (param_msb, param_lsb) = split_14bit(param);
    let (value_msb, value_lsb) = split_14bit(value);
    [
        cc(channel, 99, param_msb),
        cc(channel, 98, param_lsb),
        cc(channel, 6, value_msb),
        cc(channel, 38, value_lsb),
    ]
}

/// RPN write: CC 101/100 select the parameter, CC 6/38 carry the value
pub fn rpn(channel: MidiChannel, param: u16, value: u16) -> [ChannelMessage; 4] {
    let (param_msb, param_lsb) = split_14bit(param);
    let (value_msb, value_lsb) = split_14bit(value);
    [
        cc(channel, 101, param_msb),
        cc(channel, 100, param_lsb),
        cc(channel, 6, value_msb),
        cc(channel, 38, value_lsb),
    ]
}

/// All Notes Off, Reset All Controllers, All Sound Off
pub fn panic(channel: MidiChannel) -> [ChannelMessage; 3] {
    [cc(channel, 123, 0), cc(channel, 121, 0), cc(channel, 120, 0)]
}

/// Add F0/F7 framing where missing
pub fn frame_sysex(mut data: Vec<u8>) -> Vec<u8> {
    if data.first() != Some(&SYSEX_START) {
        data.insert(0, SYSEX_START);
    }
    if data.last() != Some(&SYSEX_END) {
        data.push(SYSEX_END);
    }
    data
}

/// Parse hex bytes such as `"F0 43 10 4C"`, `"0xF0,0x43"` or `"f04310"`
pub fn parse_hex_bytes(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .replace("0x", "")
        .replace("0X", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if digits.is_empty() {
        return Err(Error::InvalidInput("no hex bytes given".to_string()));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!("invalid hex digit {:?}", bad)));
    }
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidInput(format!(
            "odd number of hex digits in {:?}",
            input
        )));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| Error::InvalidInput(format!("invalid hex byte {:?}", &digits[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_parse_control_change() {
        let msg = ChannelMessage::from_bytes(&[0xB2, 74, 100]).unwrap();
        assert_eq!(
            msg,
            ChannelMessage::ControlChange {
                channel: ch(3),
                controller: 74,
                value: 100
            }
        );
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        let msg = ChannelMessage::from_bytes(&[0x90, 60, 0]).unwrap();
        assert!(matches!(msg, ChannelMessage::NoteOff { note: 60, .. }));
    }

    #[test]
    fn test_truncated_and_unsupported() {
        assert!(ChannelMessage::from_bytes(&[]).is_none());
        assert!(ChannelMessage::from_bytes(&[0xB0, 1]).is_none());
        assert!(ChannelMessage::from_bytes(&[0xF8]).is_none());
        assert!(ChannelMessage::from_bytes(&[0xD0, 10]).is_none());
    }

    #[test]
    fn test_parse_cc_only_for_control_change() {
        let msg = parse_cc("Korg 1", &[0xBF, 1, 64]).unwrap();
        assert_eq!(msg.channel, ch(16));
        assert_eq!(msg.device_name, "Korg 1");
        assert!(parse_cc("Korg 1", &[0x90, 60, 100]).is_none());
    }

    #[test]
    fn test_encoding() {
        assert_eq!(cc(ch(1), 74, 100).to_bytes(), vec![0xB0, 74, 100]);
        assert_eq!(
            ChannelMessage::ProgramChange { channel: ch(10), program: 5 }.to_bytes(),
            vec![0xC9, 5]
        );
        assert_eq!(
            ChannelMessage::PitchBend { channel: ch(1), value: PITCH_BEND_CENTER }.to_bytes(),
            vec![0xE0, 0x00, 0x40]
        );
        assert_eq!(
            ChannelMessage::PitchBend { channel: ch(1), value: u16::MAX }.to_bytes(),
            vec![0xE0, 0x7F, 0x7F]
        );
    }

    #[test]
    fn test_pitch_bend_parse() {
        let msg = ChannelMessage::from_bytes(&[0xE1, 0x7F, 0x7F]).unwrap();
        assert_eq!(msg, ChannelMessage::PitchBend { channel: ch(2), value: MAX_14BIT });
    }

    #[test]
    fn test_nrpn_sequence() {
        let bytes: Vec<Vec<u8>> = nrpn(ch(1), 300, 1000).iter().map(|m| m.to_bytes()).collect();
        assert_eq!(
            bytes,
            vec![
                vec![0xB0, 99, 2],
                vec![0xB0, 98, 44],
                vec![0xB0, 6, 7],
                vec![0xB0, 38, 104],
            ]
        );
    }

    #[test]
    fn test_rpn_uses_registered_controllers() {
        let msgs = rpn(ch(2), 0, 2);
        assert_eq!(msgs[0].to_bytes(), vec![0xB1, 101, 0]);
        assert_eq!(msgs[1].to_bytes(), vec![0xB1, 100, 0]);
        assert_eq!(msgs[3].to_bytes(), vec![0xB1, 38, 2]);
    }

    #[test]
    fn test_panic_order() {
        let controllers: Vec<u8> = panic(ch(1))
            .iter()
            .map(|m| m.to_bytes()[1])
            .collect();
        assert_eq!(controllers, vec![123, 121, 120]);
    }

    #[test]
    fn test_frame_sysex() {
        assert_eq!(frame_sysex(vec![0x43, 0x10]), vec![0xF0, 0x43, 0x10, 0xF7]);
        assert_eq!(frame_sysex(vec![0xF0, 0x43, 0xF7]), vec![0xF0, 0x43, 0xF7]);
        assert_eq!(frame_sysex(vec![]), vec![0xF0, 0xF7]);
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("F0 43 10 F7").unwrap(), vec![0xF0, 0x43, 0x10, 0xF7]);
        assert_eq!(parse_hex_bytes("0xF0,0x7e").unwrap(), vec![0xF0, 0x7E]);
        assert!(parse_hex_bytes("F0 4").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("  ").is_err());
    }
}
