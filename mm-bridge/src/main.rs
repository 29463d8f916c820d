//! mm-bridge - MIDImachine client
//!
//! `monitor` captures CC from hardware, tracks Sources and channel conflicts
//! and forwards values to the relay. The other subcommands send MIDI to an
//! output device or edit the remembered settings.

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mm_bridge::app::{spawn_console, Bridge};
use mm_bridge::midi::message::{self, parse_hex_bytes};
use mm_bridge::midi::{
    cc_name, list_inputs, list_outputs, ChannelMessage, MidiAccess, MidiOut, MidiSink,
};
use mm_bridge::modulation::{sweep, Lfo};
use mm_bridge::presets::{apply_preset, Preset, PresetStore};
use mm_bridge::script::run_script_file;
use mm_bridge::sources::base_name;
use mm_bridge::store::{ConfigStore, MemoryStorage};
use mm_bridge::transport::{HttpTransport, NullTransport, Transport};
use mm_common::config::{
    config_file_path, load_toml_config, resolve_state_dir, write_toml_config, TomlConfig,
};
use mm_common::MidiChannel;

use cli::{Cli, Command, ConfigAction, OutputArgs, PresetAction, SendMessage, Toggle};

const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const MIDI_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_toml_config(cli.config.as_deref());

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "mm_bridge={level},mm_common={level}",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MIDImachine bridge (mm-bridge) v{}", env!("CARGO_PKG_VERSION"));

    let state_dir = resolve_state_dir(cli.state_dir.as_deref(), &config);
    let client_name = config.bridge.client_name.clone();

    match cli.command {
        Command::Devices => print_devices(&client_name),
        Command::Monitor {
            filter,
            offline,
            ephemeral,
        } => {
            let relay_url = cli.relay_url.unwrap_or_else(|| config.bridge.relay_url.clone());
            let store = if ephemeral {
                ConfigStore::new(MemoryStorage::new())
            } else {
                ConfigStore::in_dir(&state_dir)
            };
            monitor(&client_name, store, filter.as_deref(), (!offline).then_some(relay_url)).await
        }
        Command::Send { output, message } => {
            let mut sink = open_sink(&client_name, &output)?;
            send_message(sink.as_mut(), channel_of(&output)?, message).await
        }
        Command::Sweep {
            output,
            cc,
            start,
            end,
            duration,
        } => {
            let mut sink = open_sink(&client_name, &output)?;
            let duration = seconds(duration)?;
            sweep(sink.as_mut(), channel_of(&output)?, cc, start, end, duration).await?;
            println!("Sweep complete: {} {}→{}", cc_name(cc), start, end);
            Ok(())
        }
        Command::Lfo {
            output,
            cc,
            min,
            max,
            rate,
            duration,
        } => {
            let lfo = Lfo::new(cc, min, max, rate)?;
            let mut sink = open_sink(&client_name, &output)?;
            let channel = channel_of(&output)?;
            println!("LFO on {} [{}-{}] @ {}Hz, Ctrl+C to stop", cc_name(cc), min, max, rate);
            match duration {
                Some(secs) => {
                    let limit = seconds(secs)?;
                    lfo.run(sink.as_mut(), channel, tokio::time::sleep(limit)).await?
                }
                None => lfo.run(sink.as_mut(), channel, shutdown_signal()).await?,
            };
            Ok(())
        }
        Command::Script { output, file } => {
            let mut sink = open_sink(&client_name, &output)?;
            let report = run_script_file(sink.as_mut(), channel_of(&output)?, &file)
                .await
                .with_context(|| format!("Failed to run script {}", file.display()))?;
            for (line, error) in &report.errors {
                println!("  [{}] {}", line, error);
            }
            println!("Script complete: {} command(s), {} error(s)", report.executed, report.errors.len());
            Ok(())
        }
        Command::Preset { action } => preset(&client_name, &state_dir, action).await,
        Command::Config { action } => configure(&state_dir, cli.config.as_deref(), action),
    }
}

fn print_devices(client_name: &str) -> Result<()> {
    let inputs = list_inputs(client_name).context("Failed to list MIDI inputs")?;
    let outputs = list_outputs(client_name).context("Failed to list MIDI outputs")?;

    println!("INPUT:");
    if inputs.is_empty() {
        println!("   (none)");
    }
    for port in &inputs {
        println!("   [{}] {}", port.index, port.name);
    }

    println!("OUTPUT:");
    if outputs.is_empty() {
        println!("   (none)");
    }
    for port in &outputs {
        println!("   [{}] {}", port.index, port.name);
    }
    Ok(())
}

async fn monitor(
    client_name: &str,
    store: ConfigStore,
    filter: Option<&str>,
    relay_url: Option<String>,
) -> Result<()> {
    let http = match relay_url {
        Some(url) => {
            let http = Arc::new(HttpTransport::new(url).context("Failed to create relay client")?);
            if let Err(e) = http.connect().await {
                warn!("Relay at {} unreachable ({}), retrying in background", http.base_url(), e);
            }
            tokio::spawn(Arc::clone(&http).maintain(RECONNECT_INTERVAL));
            Some(http)
        }
        None => None,
    };
    let transport: Arc<dyn Transport> = match &http {
        Some(http) => Arc::clone(http) as Arc<dyn Transport>,
        None => Arc::new(NullTransport),
    };

    let (midi_tx, midi_rx) = mpsc::channel(MIDI_QUEUE_CAPACITY);
    let access = MidiAccess::open(client_name, filter, midi_tx);
    println!("MIDI: {}", access.status());

    let (console_tx, console_rx) = mpsc::channel(16);
    spawn_console(console_tx);
    println!("Type 'help' for commands");

    let bridge = Bridge::new(store, transport);
    bridge.run(midi_rx, console_rx, shutdown_signal()).await;

    access.close();
    if let Some(http) = http {
        http.disconnect();
    }
    Ok(())
}

/// Prints every message instead of sending it
struct DryRunSink;

impl MidiSink for DryRunSink {
    fn send(&mut self, bytes: &[u8]) -> mm_bridge::Result<()> {
        println!("{:02X?}", bytes);
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

fn open_sink(client_name: &str, output: &OutputArgs) -> Result<Box<dyn MidiSink>> {
    if output.dry_run {
        return Ok(Box::new(DryRunSink));
    }
    let out = MidiOut::open(client_name, &output.port).context("Failed to open MIDI output")?;
    Ok(Box::new(out))
}

fn channel_of(output: &OutputArgs) -> Result<MidiChannel> {
    MidiChannel::new(output.channel).with_context(|| format!("Invalid channel {}", output.channel))
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid duration {}", secs))
}

async fn send_message(sink: &mut dyn MidiSink, channel: MidiChannel, msg: SendMessage) -> Result<()> {
    match msg {
        SendMessage::Cc { cc, value } => {
            sink.send_cc(channel, cc, value)?;
            println!("{} = {}", cc_name(cc), value);
        }
        SendMessage::Note {
            note,
            velocity,
            duration,
        } => {
            sink.send_message(&ChannelMessage::NoteOn { channel, note, velocity })?;
            tokio::time::sleep(seconds(duration)?).await;
            sink.send_message(&ChannelMessage::NoteOff { channel, note, velocity: 0 })?;
            println!("Note {} vel={}", note, velocity);
        }
        SendMessage::Pc { program } => {
            sink.send_message(&ChannelMessage::ProgramChange { channel, program })?;
            println!("Program = {}", program);
        }
        SendMessage::Bend { value } => {
            sink.send_message(&ChannelMessage::PitchBend { channel, value })?;
            println!("Pitch Bend = {}", value);
        }
        SendMessage::Nrpn { param, value } => {
            sink.send_all(&message::nrpn(channel, param, value))?;
            println!("NRPN {} = {}", param, value);
        }
        SendMessage::Rpn { param, value } => {
            sink.send_all(&message::rpn(channel, param, value))?;
            println!("RPN {} = {}", param, value);
        }
        SendMessage::Sysex { bytes } => {
            let data = parse_hex_bytes(&bytes.join(" "))?;
            let len = data.len();
            sink.send_sysex(data)?;
            println!("SysEx sent ({} bytes)", len);
        }
        SendMessage::Panic => {
            sink.send_all(&message::panic(channel))?;
            println!("PANIC: all notes off");
        }
    }
    Ok(())
}

async fn preset(client_name: &str, state_dir: &Path, action: PresetAction) -> Result<()> {
    let presets = PresetStore::in_state_dir(state_dir);

    match action {
        PresetAction::Save {
            name,
            values,
            program,
            channel,
        } => {
            let preset = Preset {
                cc: values.into_iter().collect(),
                channel: channel.and_then(MidiChannel::new),
                program,
            };
            let path = presets.save(&name, &preset)?;
            println!("Saved preset: {}", path.display());
        }
        PresetAction::Load { name, output } => {
            let Some(preset) = presets.load(&name)? else {
                bail!("Preset not found: {}", name);
            };
            let mut sink = open_sink(client_name, &output)?;
            let sent = apply_preset(sink.as_mut(), channel_of(&output)?, &preset).await?;
            println!("Preset {} applied ({} message(s))", name, sent);
        }
        PresetAction::List => {
            let names = presets.list()?;
            if names.is_empty() {
                println!("No presets saved yet");
            }
            for name in names {
                println!("   {}", name);
            }
        }
    }
    Ok(())
}

fn configure(state_dir: &Path, config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let store = ConfigStore::in_dir(state_dir);
    let mut settings = store.load_config();

    match action {
        ConfigAction::Show => {
            println!("State folder: {}", state_dir.display());
            println!("Forwarding: {}", if settings.udp_enabled { "on" } else { "off" });
            println!("Channels:");
            for (base, channel) in &settings.channel_map {
                println!("   {} → {}", base, channel);
            }
            println!("Renames:");
            for (base, label) in &settings.renames {
                println!("   {} → {}", base, label);
            }
            return Ok(());
        }
        ConfigAction::SetChannel { device, channel } => {
            let channel = MidiChannel::new(channel).with_context(|| format!("Invalid channel {}", channel))?;
            settings.channel_map.insert(base_name(&device), channel);
        }
        ConfigAction::Rename { device, label } => {
            let label = label.trim();
            if label.is_empty() {
                settings.renames.remove(&base_name(&device));
            } else {
                settings.renames.insert(base_name(&device), label.to_string());
            }
        }
        ConfigAction::Forget { device } => {
            let base = base_name(&device);
            settings.channel_map.remove(&base);
            settings.renames.remove(&base);
        }
        ConfigAction::Forwarding { state } => {
            settings.udp_enabled = state == Toggle::On;
        }
        ConfigAction::Init { force } => {
            let path = config_file_path(config_path).context("Could not determine config directory")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_toml_config(&TomlConfig::default(), &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            return Ok(());
        }
        ConfigAction::Reset => {
            store.reset()?;
            println!("Remembered settings cleared");
            return Ok(());
        }
    }

    if !store.save_config(&settings) {
        bail!("Failed to save settings in {}", state_dir.display());
    }
    println!("Saved");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
