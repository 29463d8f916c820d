//! Command-line interface definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use mm_bridge::midi::{shortcut_cc, PortSelector};

/// MIDImachine bridge: capture, relay and send MIDI CC
#[derive(Parser, Debug)]
#[command(name = "mm-bridge")]
#[command(about = "MIDI CC bridge and controller for MIDImachine")]
#[command(version)]
pub struct Cli {
    /// Bootstrap TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Folder for saved settings and presets (overrides [bridge] state_dir)
    #[arg(long, global = true, env = "MIDIMACHINE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Relay base URL (overrides [bridge] relay_url)
    #[arg(long, global = true, env = "MIDIMACHINE_RELAY_URL")]
    pub relay_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List MIDI input and output devices
    Devices,

    /// Capture CC from input devices and forward to the relay
    Monitor {
        /// Only open inputs whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Do not connect to the relay
        #[arg(long)]
        offline: bool,

        /// Keep settings in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Send one message to an output device
    Send {
        #[command(flatten)]
        output: OutputArgs,

        #[command(subcommand)]
        message: SendMessage,
    },

    /// Sweep a controller from one value to another
    Sweep {
        #[command(flatten)]
        output: OutputArgs,

        /// Controller number or name (cutoff, resonance, ...)
        #[arg(value_parser = parse_controller)]
        cc: u8,

        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        start: u8,

        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        end: u8,

        /// Sweep length in seconds
        #[arg(long, default_value_t = 2.0)]
        duration: f64,
    },

    /// Modulate a controller with a triangle LFO until Ctrl+C
    Lfo {
        #[command(flatten)]
        output: OutputArgs,

        #[arg(value_parser = parse_controller)]
        cc: u8,

        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        min: u8,

        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        max: u8,

        /// Rate in Hz
        rate: f64,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Run a command script
    Script {
        #[command(flatten)]
        output: OutputArgs,

        file: PathBuf,
    },

    /// Save, load and list CC presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Inspect and edit the remembered channel settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Output device selection shared by the sending commands
#[derive(Args, Debug, Clone, PartialEq)]
pub struct OutputArgs {
    /// Output port index or name fragment
    #[arg(short, long, default_value = "0")]
    pub port: PortSelector,

    /// MIDI channel
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub channel: u8,

    /// Print the bytes instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SendMessage {
    /// Control Change; the controller may be a name such as `cutoff`
    Cc {
        #[arg(value_parser = parse_controller)]
        cc: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        value: u8,
    },
    /// Note On, then Note Off after the duration
    Note {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        note: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        velocity: u8,
        /// Seconds
        #[arg(long, default_value_t = 0.5)]
        duration: f64,
    },
    /// Program Change
    Pc {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=127))]
        program: u8,
    },
    /// Pitch Bend (0-16383, 8192 = centre)
    Bend {
        #[arg(value_parser = clap::value_parser!(u16).range(0..=16383))]
        value: u16,
    },
    /// Non-Registered Parameter (14-bit)
    Nrpn {
        #[arg(value_parser = clap::value_parser!(u16).range(0..=16383))]
        param: u16,
        #[arg(value_parser = clap::value_parser!(u16).range(0..=16383))]
        value: u16,
    },
    /// Registered Parameter (14-bit)
    Rpn {
        #[arg(value_parser = clap::value_parser!(u16).range(0..=16383))]
        param: u16,
        #[arg(value_parser = clap::value_parser!(u16).range(0..=16383))]
        value: u16,
    },
    /// System Exclusive from hex bytes; F0/F7 are added when missing
    Sysex {
        #[arg(required = true, num_args = 1..)]
        bytes: Vec<String>,
    },
    /// All Notes Off, Reset All Controllers, All Sound Off
    Panic,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PresetAction {
    /// Save CC values as a preset, e.g. `preset save pad cutoff=40 71=90`
    Save {
        name: String,
        #[arg(value_parser = parse_assignment)]
        values: Vec<(u8, u8)>,
        /// Program to select when the preset is applied
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=127))]
        program: Option<u8>,
        /// Channel stored with the preset
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=16))]
        channel: Option<u8>,
    },
    /// Apply a saved preset to an output device
    Load {
        name: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List saved presets
    List,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Show remembered channels, renames and forwarding
    Show,
    /// Remember a channel for a device
    SetChannel {
        device: String,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=16))]
        channel: u8,
    },
    /// Set the display name of a device (empty to clear)
    Rename { device: String, label: String },
    /// Forget everything remembered about a device
    Forget { device: String },
    /// Turn forwarding to the relay on or off
    Forwarding { state: Toggle },
    /// Write a default bootstrap TOML file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Clear all remembered settings
    Reset,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

/// Controller number or shortcut name
fn parse_controller(s: &str) -> Result<u8, String> {
    if let Some(cc) = shortcut_cc(s) {
        return Ok(cc);
    }
    s.parse::<u8>()
        .ok()
        .filter(|cc| *cc <= 127)
        .ok_or_else(|| format!("{:?} is not a controller number (0-127) or name", s))
}

/// `<controller>=<value>`
fn parse_assignment(s: &str) -> Result<(u8, u8), String> {
    let (cc, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <cc>=<value>, got {:?}", s))?;
    let cc = parse_controller(cc.trim())?;
    let value = value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 127)
        .ok_or_else(|| format!("value in {:?} must be 0-127", s))?;
    Ok((cc, value))
}
