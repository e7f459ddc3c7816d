//! # Laudiolin Common Library
//!
//! Shared code for the Laudiolin gateway services including:
//! - Error types
//! - Bootstrap configuration loading
//! - Track records exchanged with playback clients
//! - API response types

pub mod api;
pub mod config;
pub mod error;
pub mod track;

pub use error::{Error, Result};
pub use track::TrackData;
