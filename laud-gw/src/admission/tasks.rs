//! Timer-driven admission maintenance
//!
//! Two independent tasks share the controller:
//! - reset, every `reset_window`: clears the block list
//! - sweep, every `within_window`: decays or escalates counts
//!
//! Each first fires one full period after start.

use crate::admission::controller::AdmissionController;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

/// Handles to the running maintenance tasks
///
/// Dropping the handle does not stop the tasks; call [`shutdown`](Self::shutdown).
pub struct MaintenanceTasks {
    reset: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl MaintenanceTasks {
    /// Start both tasks on the current runtime
    pub fn spawn(controller: Arc<AdmissionController>) -> Self {
        Self {
            reset: spawn_reset_task(Arc::clone(&controller)),
            sweep: spawn_sweep_task(controller),
        }
    }

    /// Stop both tasks
    pub fn shutdown(self) {
        self.reset.abort();
        self.sweep.abort();
    }
}

/// Clear the block list every `reset_window`
pub fn spawn_reset_task(controller: Arc<AdmissionController>) -> JoinHandle<()> {
    let period = controller.reset_window();
    spawn_periodic(period, move || {
        let released = controller.reset();
        if released > 0 {
            info!(released, "Rate limit reset: block list cleared");
        }
    })
}

/// Sweep request counts every `within_window`
pub fn spawn_sweep_task(controller: Arc<AdmissionController>) -> JoinHandle<()> {
    let period = controller.within_window();
    spawn_periodic(period, move || {
        let report = controller.sweep();
        if report.blocked > 0 {
            info!(blocked = report.blocked, "Rate limit sweep blocked clients at the limit");
        }
        debug!(decayed = report.decayed, "Rate limit sweep");
    })
}

fn spawn_periodic<F>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            tick();
        }
    })
}
