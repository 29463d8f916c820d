//! MIDI hardware access and message handling

pub mod cc_names;
pub mod input;
pub mod message;
pub mod output;

pub use cc_names::{cc_name, shortcut_cc};
pub use input::{list_inputs, list_outputs, MidiAccess, MidiStatus, PortInfo};
pub use message::{ChannelMessage, MAX_14BIT, PITCH_BEND_CENTER};
pub use output::{CaptureSink, MidiOut, MidiSink, PortSelector};
