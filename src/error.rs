use std::time::Duration;
use thiserror::Error;

/// Result type for HEOS operations
pub type Result<T> = std::result::Result<T, HeosError>;

/// Errors that can occur when discovering or controlling a HEOS device
#[derive(Error, Debug)]
pub enum HeosError {
    /// No usable SSDP response was received
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Socket error while connecting, sending or receiving
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The device closed the connection, or the client was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The device answered the command with `result: fail`
    #[error("Command {command} failed: {message}")]
    CommandFailed {
        /// Command path the failure answers
        command: String,
        /// Device-supplied explanation, verbatim
        message: String,
    },

    /// Malformed or unexpected data from the device
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No matching reply arrived within the request timeout
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller-supplied argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// A player-scoped command was issued before any player was resolved
    #[error("No player selected; call get_players first or pass a player id")]
    NoPlayer,
}

impl HeosError {
    /// True for socket-level failures a caller may answer by reconnecting
    pub fn is_transport_error(&self) -> bool {
        matches!(self, HeosError::Transport(_) | HeosError::ConnectionClosed)
    }

    /// True for malformed, unmatched or timed-out replies
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            HeosError::Protocol(_) | HeosError::Timeout(_) | HeosError::Json(_)
        )
    }
}
