//! Error types for mm-bridge

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    /// MIDI subsystem or port errors
    #[error("MIDI error: {0}")]
    Midi(String),

    /// Relay connection errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persistent storage errors (quota, permissions, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Preset file errors
    #[error("Preset error: {0}")]
    Preset(String),

    /// Script line that could not be parsed
    #[error("Script error on line {line}: {message}")]
    Script { line: usize, message: String },

    /// Invalid command-line or console input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// mm-common error
    #[error(transparent)]
    Common(#[from] mm_common::Error),
}

/// Convenience Result type using the bridge Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Midi(e.to_string())
    }
}

impl<T> From<midir::ConnectError<T>> for Error {
    fn from(e: midir::ConnectError<T>) -> Self {
        Error::Midi(e.kind().to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::Midi(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
