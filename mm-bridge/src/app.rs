//! Bridge app loop
//!
//! One task owns the [`BridgeState`]. MIDI input callbacks and console
//! commands reach it through mpsc channels; the effects returned by the
//! reducer are carried out here against the [`ConfigStore`] and the
//! injected [`Transport`].

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mm_common::events::CcMessage;
use mm_common::MidiChannel;

use crate::midi::cc_name;
use crate::sources::{base_groups, is_channel_available, ConflictSummary, Source};
use crate::state::{Action, BridgeState, Effect};
use crate::store::ConfigStore;
use crate::transport::{forward_value, send_channel_update, send_ping, Transport};
use crate::{Error, Result};

/// A Source named on the console: 1-based list position or full id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Index(usize),
    Id(String),
}

impl SourceRef {
    fn parse(s: &str) -> Self {
        match s.parse::<usize>() {
            Ok(n) => SourceRef::Index(n),
            Err(_) => SourceRef::Id(s.to_string()),
        }
    }
}

/// Interactive console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Conflicts,
    SetChannel { source: SourceRef, channel: MidiChannel },
    Auto(SourceRef),
    Rename { source: SourceRef, label: String },
    Remove(SourceRef),
    Forget(String),
    Forward(bool),
    Ping,
    Status,
    Help,
    Quit,
}

pub const CONSOLE_HELP: &str = "\
Commands:
  list                       Show sources
  conflicts                  Show channel conflicts
  channel <source> <1-16>    Move a source to a channel
  auto <source>              Move a source to the first free channel
  rename <source> [label]    Rename a source (no label restores the port name)
  remove <source>            Remove a source
  forget <device>            Forget a device and its remembered settings
  forward on|off             Toggle forwarding to the relay
  ping                       Send a test event to the relay
  status                     Show relay and forwarding state
  help                       This help
  quit                       Exit
<source> is a number from `list` or a source id such as \"Korg 1_ch3\".";

/// Parse one console line; `Ok(None)` for blank input
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    let Some((command, rest)) = split_word(line) else {
        return Ok(None);
    };

    let invalid = |usage: &str| Error::InvalidInput(format!("usage: {}", usage));

    let parsed = match command.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "conflicts" => ConsoleCommand::Conflicts,
        "channel" | "ch" => {
            let usage = "channel <source> <1-16>";
            let (source, channel) = rest.rsplit_once(char::is_whitespace).ok_or_else(|| invalid(usage))?;
            let channel = channel
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(MidiChannel::new)
                .ok_or_else(|| invalid(usage))?;
            ConsoleCommand::SetChannel {
                source: SourceRef::parse(source.trim()),
                channel,
            }
        }
        "auto" => ConsoleCommand::Auto(source_arg(rest).ok_or_else(|| invalid("auto <source>"))?),
        "rename" => {
            // Ids contain spaces, so only a list number may be followed by a label
            let (source, label) = match split_word(rest) {
                Some((first, label)) if first.parse::<usize>().is_ok() => {
                    (SourceRef::parse(first), label.to_string())
                }
                _ => return Err(invalid("rename <number> [label]")),
            };
            ConsoleCommand::Rename { source, label }
        }
        "remove" | "rm" => {
            ConsoleCommand::Remove(source_arg(rest).ok_or_else(|| invalid("remove <source>"))?)
        }
        "forget" => {
            if rest.is_empty() {
                return Err(invalid("forget <device>"));
            }
            ConsoleCommand::Forget(rest.to_string())
        }
        "forward" => match rest.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => ConsoleCommand::Forward(true),
            "off" | "false" | "0" => ConsoleCommand::Forward(false),
            _ => return Err(invalid("forward on|off")),
        },
        "ping" => ConsoleCommand::Ping,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => {
            return Err(Error::InvalidInput(format!(
                "unknown command {:?}, type 'help'",
                other
            )))
        }
    };
    Ok(Some(parsed))
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Some(match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    })
}

fn source_arg(rest: &str) -> Option<SourceRef> {
    (!rest.is_empty()).then(|| SourceRef::parse(rest))
}

/// Source table for the console, grouped by instrument
///
/// Entries keep their list number so they can be named in commands.
pub fn render_sources(sources: &[Source]) -> String {
    if sources.is_empty() {
        return "No sources yet. Move a control on a connected device.".to_string();
    }

    let mut out = String::new();
    for (base, group) in base_groups(sources) {
        let _ = writeln!(out, "{}", if base.is_empty() { "(unnamed)" } else { base.as_str() });
        for source in group {
            let number = sources.iter().position(|s| s.id == source.id).unwrap_or_default() + 1;
            let values: Vec<String> = source
                .values
                .iter()
                .map(|(cc, value)| format!("{}={}", cc_name(*cc), value))
                .collect();
            let _ = writeln!(
                out,
                "  [{}] ch{:<2} {}  ({})  {}",
                number,
                source.channel,
                source.label,
                source.id,
                values.join(" ")
            );
        }
    }
    out.trim_end().to_string()
}

/// Conflict report for the console and logs
pub fn render_conflicts(summary: &ConflictSummary) -> String {
    if !summary.has_conflicts {
        return "No channel conflicts".to_string();
    }

    let mut out = format!(
        "{} conflicting channel(s), {} source(s) involved",
        summary.conflict_count, summary.device_count
    );
    for (channel, sources) in &summary.conflicts {
        let labels: Vec<&str> = sources.iter().map(|s| s.label.as_str()).collect();
        let _ = write!(out, "\n  ch{}: {}", channel, labels.join(", "));
    }
    out
}

/// The bridge: state owner plus effect executor
pub struct Bridge {
    state: BridgeState,
    store: ConfigStore,
    transport: Arc<dyn Transport>,
}

impl Bridge {
    /// Start from the persisted config
    pub fn new(store: ConfigStore, transport: Arc<dyn Transport>) -> Self {
        let config = store.load_config();
        Self {
            state: BridgeState::new(config),
            store,
            transport,
        }
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// Apply an action and carry out its effects
    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        let effects = self.state.apply(action);
        for effect in &effects {
            self.execute(effect);
        }
        effects
    }

    fn execute(&self, effect: &Effect) {
        match effect {
            Effect::SaveConfig => {
                if !self.store.save_config(self.state.config()) {
                    warn!("Settings could not be saved; changes will be lost on exit");
                }
            }
            Effect::EmitChannelUpdate {
                device_name,
                channel,
            } => {
                send_channel_update(self.transport.as_ref(), device_name, *channel);
            }
            Effect::ForwardValue(msg) => {
                forward_value(self.transport.as_ref(), msg.clone());
            }
            Effect::ConflictsChanged(summary) => {
                if summary.has_conflicts {
                    warn!("{}", render_conflicts(summary));
                } else {
                    info!("Channel conflicts resolved");
                }
            }
        }
    }

    fn resolve(&self, source: &SourceRef) -> Result<String> {
        let sources = self.state.sources();
        let found = match source {
            SourceRef::Index(n) => n.checked_sub(1).and_then(|i| sources.get(i)),
            SourceRef::Id(id) => sources.iter().find(|s| &s.id == id),
        };
        found
            .map(|s| s.id.clone())
            .ok_or_else(|| Error::InvalidInput(format!("no such source: {:?}", source)))
    }

    /// Run a console command, returning the text to show
    pub fn handle_console(&mut self, command: ConsoleCommand) -> Result<String> {
        let reply = match command {
            ConsoleCommand::List => render_sources(self.state.sources()),
            ConsoleCommand::Conflicts => render_conflicts(&self.state.conflicts()),
            ConsoleCommand::SetChannel { source, channel } => {
                let id = self.resolve(&source)?;
                let available = is_channel_available(self.state.sources(), channel, &id);
                self.dispatch(Action::SetChannel { id: id.clone(), channel });
                if available {
                    format!("{} on channel {}", id, channel)
                } else {
                    format!(
                        "{} on channel {} (warning: another instrument already uses channel {})",
                        id, channel, channel
                    )
                }
            }
            ConsoleCommand::Auto(source) => {
                let id = self.resolve(&source)?;
                self.dispatch(Action::AutoAssign { id: id.clone() });
                let channel = self.state.source(&id).map(|s| s.channel).unwrap_or_default();
                format!("{} on channel {}", id, channel)
            }
            ConsoleCommand::Rename { source, label } => {
                let id = self.resolve(&source)?;
                self.dispatch(Action::Rename { id: id.clone(), label });
                let label = self.state.source(&id).map(|s| s.label.clone()).unwrap_or_default();
                format!("{} is now {:?}", id, label)
            }
            ConsoleCommand::Remove(source) => {
                let id = self.resolve(&source)?;
                self.dispatch(Action::Remove { id: id.clone() });
                format!("Removed {}", id)
            }
            ConsoleCommand::Forget(base) => {
                self.dispatch(Action::ForgetDevice { base: base.clone() });
                format!("Forgot {}", base)
            }
            ConsoleCommand::Forward(enabled) => {
                self.dispatch(Action::SetForwarding(enabled));
                format!("Forwarding {}", if enabled { "on" } else { "off" })
            }
            ConsoleCommand::Ping => {
                let ping = CcMessage::new("mm-bridge", MidiChannel::default(), 0, 0);
                if send_ping(self.transport.as_ref(), ping) {
                    "Ping sent".to_string()
                } else {
                    "Not connected to relay".to_string()
                }
            }
            ConsoleCommand::Status => format!(
                "relay: {}, forwarding: {}, sources: {}",
                if self.transport.is_connected() {
                    "connected"
                } else {
                    "disconnected"
                },
                if self.state.config().udp_enabled {
                    "on"
                } else {
                    "off"
                },
                self.state.sources().len()
            ),
            ConsoleCommand::Help => CONSOLE_HELP.to_string(),
            ConsoleCommand::Quit => String::new(),
        };
        Ok(reply)
    }

    /// Process MIDI input and console commands until `shutdown` resolves,
    /// `quit` is entered or both channels close
    pub async fn run<F>(
        mut self,
        mut midi_rx: mpsc::Receiver<CcMessage>,
        mut console_rx: mpsc::Receiver<ConsoleCommand>,
        shutdown: F,
    ) -> BridgeState
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut midi_open = true;
        let mut console_open = true;

        while midi_open || console_open {
            tokio::select! {
                _ = &mut shutdown => break,
                msg = midi_rx.recv(), if midi_open => match msg {
                    Some(msg) => {
                        debug!("CC {} ch{} {}={}", msg.device_name, msg.channel, msg.cc, msg.value);
                        self.dispatch(Action::ControlChange(msg));
                    }
                    None => {
                        debug!("MIDI input closed");
                        midi_open = false;
                    }
                },
                command = console_rx.recv(), if console_open => match command {
                    Some(command) => {
                        if !self.console(command) {
                            break;
                        }
                    }
                    None => console_open = false,
                },
            }
        }

        info!("Bridge stopped with {} source(s)", self.state.sources().len());
        self.state
    }

    /// Handle one console command; false when the loop should stop
    fn console(&mut self, command: ConsoleCommand) -> bool {
        if command == ConsoleCommand::Quit {
            return false;
        }
        match self.handle_console(command) {
            Ok(reply) => println!("{}", reply),
            Err(e) => println!("{}", e),
        }
        true
    }
}

/// Read console commands from stdin into `tx`
pub fn spawn_console(tx: mpsc::Sender<ConsoleCommand>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            };
            match parse_console_line(&line) {
                Ok(Some(command)) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> MidiChannel {
        MidiChannel::new(n).unwrap()
    }

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_console_line("list").unwrap(), Some(ConsoleCommand::List));
        assert_eq!(parse_console_line("   ").unwrap(), None);
        assert_eq!(
            parse_console_line("channel 2 5").unwrap(),
            Some(ConsoleCommand::SetChannel { source: SourceRef::Index(2), channel: ch(5) })
        );
        assert_eq!(
            parse_console_line("channel Korg 1_ch3 7").unwrap(),
            Some(ConsoleCommand::SetChannel {
                source: SourceRef::Id("Korg 1_ch3".to_string()),
                channel: ch(7)
            })
        );
        assert_eq!(
            parse_console_line("rename 1 Lead Synth").unwrap(),
            Some(ConsoleCommand::Rename { source: SourceRef::Index(1), label: "Lead Synth".to_string() })
        );
        assert_eq!(
            parse_console_line("forget Korg 2").unwrap(),
            Some(ConsoleCommand::Forget("Korg 2".to_string()))
        );
        assert_eq!(parse_console_line("forward off").unwrap(), Some(ConsoleCommand::Forward(false)));
        assert_eq!(parse_console_line("Q").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_console_errors() {
        assert!(parse_console_line("channel 1 17").is_err());
        assert!(parse_console_line("channel").is_err());
        assert!(parse_console_line("rename Korg x").is_err());
        assert!(parse_console_line("forward maybe").is_err());
        assert!(parse_console_line("dance").is_err());
    }

    #[test]
    fn test_render_empty() {
        assert!(render_sources(&[]).starts_with("No sources"));
        let summary = crate::sources::conflict_summary(&[]);
        assert_eq!(render_conflicts(&summary), "No channel conflicts");
    }

    #[test]
    fn test_render_conflicts_lists_labels() {
        let sources = vec![Source::new("Korg", ch(3)), Source::new("Roland", ch(3))];
        let text = render_conflicts(&crate::sources::conflict_summary(&sources));
        assert!(text.contains("1 conflicting channel(s), 2 source(s)"));
        assert!(text.contains("ch3: Korg, Roland"));
    }

    #[test]
    fn test_render_groups_ports_and_keeps_numbers() {
        let sources = vec![
            Source::new("Roland", ch(1)),
            Source::new("Korg 1", ch(3)),
            Source::new("Korg 2", ch(3)),
        ];
        let text = render_sources(&sources);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "korg");
        assert!(lines[1].starts_with("  [2] ch3"));
        assert!(lines[2].starts_with("  [3] ch3"));
        assert_eq!(lines[3], "roland");
        assert!(lines[4].starts_with("  [1] ch1"));
    }

    #[test]
    fn test_channel_move_warns_on_conflict() {
        use crate::store::MemoryStorage;
        use crate::transport::NullTransport;

        let mut bridge = Bridge::new(ConfigStore::new(MemoryStorage::new()), Arc::new(NullTransport));
        bridge.dispatch(Action::ControlChange(CcMessage::new("Korg 1", ch(3), 74, 1)));
        bridge.dispatch(Action::ControlChange(CcMessage::new("Korg 2", ch(4), 74, 1)));
        bridge.dispatch(Action::ControlChange(CcMessage::new("Roland", ch(5), 74, 1)));

        // Another port of the same instrument is not a conflict
        let reply = bridge
            .handle_console(ConsoleCommand::SetChannel { source: SourceRef::Index(2), channel: ch(3) })
            .unwrap();
        assert!(!reply.contains("warning"));

        let reply = bridge
            .handle_console(ConsoleCommand::SetChannel { source: SourceRef::Index(3), channel: ch(3) })
            .unwrap();
        assert!(reply.contains("warning"));
        assert_eq!(bridge.state().source("Roland_ch5").unwrap().channel, ch(3));
        assert!(bridge.state().conflicts().has_conflicts);
    }
}
