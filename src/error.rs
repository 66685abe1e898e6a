//! Error types for the intercom

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device collaborator errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Buffer overflow")]
    BufferOverflow,

    #[error("Sink is closed")]
    SinkClosed,

    #[error("Source is closed")]
    SourceClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("Not connected")]
    NotConnected,
}

/// Text channel framing errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Unknown text framing: {0}")]
    UnknownFraming(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
