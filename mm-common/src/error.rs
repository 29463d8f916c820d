//! Common error types for MIDImachine

use thiserror::Error;

/// Common result type for MIDImachine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the relay and the bridge
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user input or event field
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
