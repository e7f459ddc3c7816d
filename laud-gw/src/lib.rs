//! laud-gw: gateway control channel and ingress admission for Laudiolin
//!
//! - [`gateway`]: command/response sessions over a client's push channel
//! - [`admission`]: per-client rate limiting in front of every route
//! - [`api`]: the HTTP surface tying both together

pub mod admission;
pub mod api;
pub mod error;
pub mod gateway;

pub use error::{Error, GatewayError, GatewayResult, Result};
