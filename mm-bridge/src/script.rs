//! Script runner
//!
//! A script is a text file with one command per line:
//!
//! ```text
//! # filter opening
//! channel 2
//! cc 74 0
//! wait 0.5
//! cc 74 127
//! note 60 100 0.25
//! pc 5
//! nrpn 300 1000
//! ```
//!
//! Blank lines and `#` comments are skipped. A line that fails to parse or
//! send is reported and the script continues.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use mm_common::MidiChannel;

use crate::midi::message::{self, MAX_14BIT};
use crate::midi::{cc_name, ChannelMessage, MidiSink};
use crate::{Error, Result};

/// Note length when a `note` line gives none
pub const DEFAULT_NOTE_DURATION: Duration = Duration::from_millis(500);

/// One parsed script line
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Cc { cc: u8, value: u8 },
    Note { note: u8, velocity: u8, duration: Duration },
    ProgramChange(u8),
    Nrpn { param: u16, value: u16 },
    Wait(Duration),
    Channel(MidiChannel),
}

/// Result of running a script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptReport {
    /// Commands that ran successfully
    pub executed: usize,
    /// Failed lines as (line number, message)
    pub errors: Vec<(usize, String)>,
}

/// Parse one script line (1-based `line` for error reporting)
///
/// Returns `Ok(None)` for blank lines and comments.
pub fn parse_line(line: usize, text: &str) -> Result<Option<ScriptCommand>> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    let err = |message: String| Error::Script { line, message };

    let command = match parts[0].to_ascii_lowercase().as_str() {
        "cc" => ScriptCommand::Cc {
            cc: data_byte(arg(&parts, 1, "controller").map_err(err)?).map_err(err)?,
            value: data_byte(arg(&parts, 2, "value").map_err(err)?).map_err(err)?,
        },
        "note" => ScriptCommand::Note {
            note: data_byte(arg(&parts, 1, "note").map_err(err)?).map_err(err)?,
            velocity: data_byte(arg(&parts, 2, "velocity").map_err(err)?).map_err(err)?,
            duration: match parts.get(3) {
                Some(secs) => seconds(secs).map_err(err)?,
                None => DEFAULT_NOTE_DURATION,
            },
        },
        "pc" => ScriptCommand::ProgramChange(data_byte(arg(&parts, 1, "program").map_err(err)?).map_err(err)?),
        "nrpn" => ScriptCommand::Nrpn {
            param: fourteen_bit(arg(&parts, 1, "parameter").map_err(err)?).map_err(err)?,
            value: fourteen_bit(arg(&parts, 2, "value").map_err(err)?).map_err(err)?,
        },
        "wait" | "sleep" => ScriptCommand::Wait(seconds(arg(&parts, 1, "seconds").map_err(err)?).map_err(err)?),
        "channel" => {
            let raw = arg(&parts, 1, "channel").map_err(err)?;
            let channel = raw
                .parse::<u8>()
                .ok()
                .and_then(MidiChannel::new)
                .ok_or_else(|| err(format!("channel {:?} not in 1-16", raw)))?;
            ScriptCommand::Channel(channel)
        }
        other => return Err(err(format!("unknown command {:?}", other))),
    };

    Ok(Some(command))
}

fn arg<'a>(parts: &[&'a str], index: usize, what: &str) -> std::result::Result<&'a str, String> {
    parts
        .get(index)
        .copied()
        .ok_or_else(|| format!("missing {}", what))
}

fn data_byte(s: &str) -> std::result::Result<u8, String> {
    s.parse::<u8>()
        .ok()
        .filter(|v| *v <= 127)
        .ok_or_else(|| format!("{:?} is not a value in 0-127", s))
}

fn fourteen_bit(s: &str) -> std::result::Result<u16, String> {
    s.parse::<u16>()
        .ok()
        .filter(|v| *v <= MAX_14BIT)
        .ok_or_else(|| format!("{:?} is not a value in 0-{}", s, MAX_14BIT))
}

fn seconds(s: &str) -> std::result::Result<Duration, String> {
    s.parse::<f64>()
        .ok()
        .and_then(|v| Duration::try_from_secs_f64(v).ok())
        .ok_or_else(|| format!("{:?} is not a duration in seconds", s))
}

/// Run script text against `sink`, starting on `channel`
pub async fn run_script(sink: &mut dyn MidiSink, channel: MidiChannel, text: &str) -> ScriptReport {
    let mut channel = channel;
    let mut report = ScriptReport::default();

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        let command = match parse_line(number, line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}", e);
                report.errors.push((number, e.to_string()));
                continue;
            }
        };

        match execute(sink, &mut channel, &command).await {
            Ok(()) => report.executed += 1,
            Err(e) => {
                warn!("Line {}: {}", number, e);
                report.errors.push((number, e.to_string()));
            }
        }
    }

    report
}

/// Read and run a script file
pub async fn run_script_file(
    sink: &mut dyn MidiSink,
    channel: MidiChannel,
    path: &Path,
) -> Result<ScriptReport> {
    let text = tokio::fs::read_to_string(path).await?;
    info!("Running script {}", path.display());
    let report = run_script(sink, channel, &text).await;
    info!(
        "Script complete: {} command(s), {} error(s)",
        report.executed,
        report.errors.len()
    );
    Ok(report)
}

async fn execute(
    sink: &mut dyn MidiSink,
    channel: &mut MidiChannel,
    command: &ScriptCommand,
) -> Result<()> {
    match *command {
        ScriptCommand::Cc { cc, value } => {
            sink.send_cc(*channel, cc, value)?;
            info!("{} = {}", cc_name(cc), value);
        }
        ScriptCommand::Note {
            note,
            velocity,
            duration,
        } => {
            sink.send_message(&ChannelMessage::NoteOn {
                channel: *channel,
                note,
                velocity,
            })?;
            tokio::time::sleep(duration).await;
            sink.send_message(&ChannelMessage::NoteOff {
                channel: *channel,
                note,
                velocity: 0,
            })?;
            info!("Note {} vel={}", note, velocity);
        }
        ScriptCommand::ProgramChange(program) => {
            sink.send_message(&ChannelMessage::ProgramChange {
                channel: *channel,
                program,
            })?;
            info!("Program = {}", program);
        }
        ScriptCommand::Nrpn { param, value } => {
            sink.send_all(&message::nrpn(*channel, param, value))?;
            info!("NRPN {} = {}", param, value);
        }
        ScriptCommand::Wait(duration) => {
            tokio::time::sleep(duration).await;
        }
        ScriptCommand::Channel(new_channel) => {
            *channel = new_channel;
            info!("Channel = {}", new_channel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::CaptureSink;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line(1, "cc 74 100").unwrap(), Some(ScriptCommand::Cc { cc: 74, value: 100 }));
        assert_eq!(
            parse_line(1, "NOTE 60 90").unwrap(),
            Some(ScriptCommand::Note {
                note: 60,
                velocity: 90,
                duration: DEFAULT_NOTE_DURATION
            })
        );
        assert_eq!(parse_line(1, "pc 3").unwrap(), Some(ScriptCommand::ProgramChange(3)));
        assert_eq!(
            parse_line(1, "sleep 0.25").unwrap(),
            Some(ScriptCommand::Wait(Duration::from_millis(250)))
        );
        assert_eq!(parse_line(1, "channel 16").unwrap(), Some(ScriptCommand::Channel(ch(16))));
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        assert!(parse_line(1, "wait 1e30").is_err());
        assert!(parse_line(1, "wait -1").is_err());
        assert!(parse_line(1, "note 60 100 1e30").is_err());
        assert!(parse_line(1, "wait inf").is_err());
    }

    #[tokio::test]
    async fn test_huge_wait_reported_and_skipped() {
        let mut sink = CaptureSink::new();
        let report = run_script(&mut sink, ch(1), "wait 1e30\ncc 1 2").await;

        assert_eq!(report.executed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 1);
        assert_eq!(sink.sent(), &[vec![0xB0, 1, 2]]);
    }

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(1, "   # set up").unwrap(), None);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        match parse_line(7, "cc 74") {
            Err(Error::Script { line, message }) => {
                assert_eq!(line, 7);
                assert!(message.contains("value"));
            }
            other => panic!("expected script error, got {:?}", other),
        }
        assert!(parse_line(1, "cc 200 1").is_err());
        assert!(parse_line(1, "channel 0").is_err());
        assert!(parse_line(1, "wait -1").is_err());
        assert!(parse_line(1, "dance").is_err());
    }

    #[tokio::test]
    async fn test_run_script_skips_bad_lines() {
        let script = "# demo\ncc 74 10\nbogus\nchannel 3\ncc 71 20\nnrpn 1 2\n";
        let mut sink = CaptureSink::new();

        let report = run_script(&mut sink, ch(1), script).await;

        assert_eq!(report.executed, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 3);
        assert_eq!(sink.sent()[0], vec![0xB0, 74, 10]);
        assert_eq!(sink.sent()[1], vec![0xB2, 71, 20]);
        assert_eq!(sink.sent().len(), 6);
    }

    #[tokio::test]
    async fn test_note_sends_on_then_off() {
        let mut sink = CaptureSink::new();
        let report = run_script(&mut sink, ch(1), "note 60 100 0").await;

        assert_eq!(report.executed, 1);
        assert_eq!(sink.sent(), &[vec![0x90, 60, 100], vec![0x80, 60, 0]]);
    }
}
