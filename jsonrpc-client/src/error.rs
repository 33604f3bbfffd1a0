//! Error types for the JSON-RPC connection

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a JSON-RPC peer
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP connection could not be established
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Socket read or write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be serialized
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// No correlated reply arrived before the deadline
    #[error("No reply to {method} within {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// The connection was shut down, by either side
    #[error("Connection closed")]
    Closed,

    /// The peer answered with a JSON-RPC error object
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },
}

pub type Result<T> = std::result::Result<T, TransportError>;
