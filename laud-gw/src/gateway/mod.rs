//! Gateway control channel to remote playback clients
//!
//! - [`session`]: the command/response session over one client channel
//! - [`commands`]: playback commands built on a session
//! - [`frame`]: inbound frame decoding
//! - [`registry`]: connected sessions keyed by client label

pub mod commands;
pub mod frame;
pub mod registry;
pub mod session;

pub use commands::Command;
pub use frame::{Frame, MalformedFrame};
pub use registry::SessionRegistry;
pub use session::{GatewaySession, Waiter};
