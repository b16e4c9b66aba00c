//! Error types for hubwire-server.

use thiserror::Error;

/// Main error type for response framing and writing.
#[derive(Debug, Error)]
pub enum HubError {
    /// I/O error while writing to the duplex stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (malformed envelope, oversize message, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Writer task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound queue is full.
    #[error("Outbound queue full")]
    Backpressure,
}

/// Result type alias using HubError.
pub type Result<T> = std::result::Result<T, HubError>;
