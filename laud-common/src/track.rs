//! Track records exchanged with playback clients

use serde::{Deserialize, Serialize};

/// A single track as reported by a playback client
///
/// Every field defaults when absent so partially populated records from
/// older clients still decode. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackData {
    /// Source-specific track identifier
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Cover art URL
    pub icon: String,
    /// Canonical URL of the track at its source
    pub url: String,
    /// Length in seconds
    pub duration: u64,
}
