//! Network error types.

use thiserror::Error;

/// Errors from the network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Socket or thread creation failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A datagram was not a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A message decoded but described an impossible command.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// The network thread has stopped.
    #[error("network thread is not running")]
    Disconnected,
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
