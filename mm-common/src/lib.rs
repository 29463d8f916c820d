//! # MIDImachine Common Library
//!
//! Shared code for the MIDImachine relay and bridge including:
//! - MIDI channel type (validated 1-16)
//! - Relay wire events (RelayEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - SSE helpers

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use channel::MidiChannel;
pub use error::{Error, Result};
