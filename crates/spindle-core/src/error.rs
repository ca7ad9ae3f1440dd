//! Synchronization error types

use thiserror::Error;

/// Errors raised while talking to the backend
#[derive(Error, Debug)]
pub enum SyncError {
    /// Notification payload did not match its channel's schema
    #[error("Malformed payload on channel {channel}: {source}")]
    Decode {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    /// Notification arrived on a channel with no known schema
    #[error("Unknown notification channel: {0}")]
    UnknownChannel(String),

    /// Backend rejected a command
    #[error("Command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    /// Backend reply did not match the command's result type
    #[error("Unexpected reply to {command}: {source}")]
    Reply {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Reply channel dropped before an answer arrived
    #[error("Connection closed before {0} completed")]
    Disconnected(&'static str),

    /// Socket or framing failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
