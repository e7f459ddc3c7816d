//! Ingress admission control (per-client rate limiting)
//!
//! - [`controller`]: shared counts/block list and the per-request decision
//! - [`layer`]: tower layer running the decision before any handler
//! - [`tasks`]: periodic reset and sweep

pub mod controller;
pub mod layer;
pub mod tasks;

pub use controller::{AdmissionController, Decision, RejectReason, SweepReport};
pub use layer::{AdmissionLayer, X_RATE_LIMIT, X_RATE_LIMIT_REMAINING};
pub use tasks::MaintenanceTasks;
