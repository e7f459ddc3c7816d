//! Common error types for Laudiolin

use thiserror::Error;

/// Common result type for Laudiolin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Laudiolin services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
