//! Inbound gateway frames
//!
//! A frame is one JSON object received from the playback client. Its `type`
//! field names the frame kind; everything else is kind-specific payload.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Why an inbound message could not be turned into a [`Frame`]
///
/// Malformed frames are logged and dropped by the receive loop; they never
/// reach callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedFrame {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string 'type' field")]
    MissingType,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    kind: String,
    body: Value,
}

impl Frame {
    /// Decode a text message into a frame
    pub fn parse(text: &str) -> Result<Self, MalformedFrame> {
        let body: Value =
            serde_json::from_str(text).map_err(|e| MalformedFrame::InvalidJson(e.to_string()))?;
        Self::from_value(body)
    }

    /// Build a frame from an already decoded JSON value
    pub fn from_value(body: Value) -> Result<Self, MalformedFrame> {
        let object = body.as_object().ok_or(MalformedFrame::NotAnObject)?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MalformedFrame::MissingType)?
            .to_string();

        Ok(Self { kind, body })
    }

    /// The frame's `type`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Full frame body, `type` included
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// A single payload field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body)
    }
}
