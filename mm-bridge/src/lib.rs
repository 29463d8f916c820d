//! mm-bridge library
//!
//! The MIDImachine client: captures CC from hardware ports, keeps the list of
//! Sources with their channel assignments, detects channel conflicts between
//! instruments, persists remembered settings and forwards values to the
//! relay. Also carries the MIDI output tooling (send, sweep, LFO, scripts,
//! presets) used by the `mm-bridge` binary.

pub mod app;
pub mod error;
pub mod midi;
pub mod modulation;
pub mod presets;
pub mod script;
pub mod sources;
pub mod state;
pub mod store;
pub mod transport;

pub use app::Bridge;
pub use error::{Error, Result};
pub use sources::Source;
pub use state::{Action, BridgeState, Effect};
pub use store::{Config, ConfigStore};
pub use transport::Transport;
