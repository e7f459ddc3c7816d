//! Error types for laud-gw
//!
//! [`GatewayError`] is what session and command operations return to their
//! callers. [`Error`] covers service startup and HTTP serving.

use thiserror::Error;

/// Errors surfaced by a gateway session and the command vocabulary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The underlying channel refused a write
    #[error("Gateway channel closed: {0}")]
    ChannelClosed(String),

    /// The session terminated before the operation completed
    #[error("Gateway session closed")]
    SessionClosed,

    /// A bounded wait expired before the awaited frame arrived
    #[error("Timed out waiting for '{kind}' frame")]
    Timeout { kind: String },

    /// An outbound command could not be encoded
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// A frame arrived but its payload had the wrong shape
    #[error("Failed to decode '{kind}' frame: {reason}")]
    Decode { kind: String, reason: String },
}

/// Convenience Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Main error type for the laud-gw service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] laud_common::Error),

    /// Listener bind or serve errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File and socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Gateway errors escaping to the service level
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Convenience Result type using laud-gw Error
pub type Result<T> = std::result::Result<T, Error>;
