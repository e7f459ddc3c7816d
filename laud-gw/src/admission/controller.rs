//! Per-client request counting and block list
//!
//! Two independent paths put an address on the block list:
//! - the synchronous check, when a request reaches `max_requests`
//! - the periodic sweep, for any address whose count is at or above the limit
//!
//! Both are kept. The synchronous path removes the address from `counts`
//! when it blocks, so in practice the sweep only catches counts that reached
//! the limit some other way; the overlap is tolerated rather than merged.

use laud_common::config::{FailMode, RateLimitConfig};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Address was already on the block list
    Blocked,
    /// This request reached the limit
    LimitReached,
    /// Decision could not be computed and the controller fails closed
    Unavailable,
}

/// Outcome of the per-request check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Address is exempt; no accounting, no headers
    Exempt,
    /// Request may proceed
    Allow { limit: u32, remaining: u32 },
    /// Request is refused with 429
    Reject {
        limit: u32,
        remaining: u32,
        reason: RejectReason,
    },
    /// Decision could not be computed and the controller fails open
    Unchecked,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Reject { .. })
    }

    /// Values for `X-Rate-Limit` and `X-Rate-Limit-Remaining`, if any
    pub fn headers(&self) -> Option<(u32, u32)> {
        match *self {
            Decision::Allow { limit, remaining } | Decision::Reject { limit, remaining, .. } => {
                Some((limit, remaining))
            }
            Decision::Exempt | Decision::Unchecked => None,
        }
    }
}

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries below the limit that were dropped
    pub decayed: usize,
    /// Entries at or above the limit that moved to the block list
    pub blocked: usize,
}

#[derive(Debug, Default)]
struct AdmissionState {
    counts: HashMap<IpAddr, u32>,
    blocked: HashSet<IpAddr>,
}

/// Shared admission state for the lifetime of the HTTP server
///
/// One mutex guards both `counts` and `blocked`, so every check, sweep and
/// reset sees and leaves a consistent pair.
#[derive(Debug)]
pub struct AdmissionController {
    max_requests: u32,
    within_window: Duration,
    reset_window: Duration,
    exempt: HashSet<IpAddr>,
    fail_mode: FailMode,
    trust_forwarded_for: bool,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    /// Build from configuration; read once, no hot reload
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            within_window: config.within_window,
            reset_window: config.reset_window,
            exempt: config.exempt.iter().copied().collect(),
            fail_mode: config.fail_mode,
            trust_forwarded_for: config.trust_forwarded_for,
            state: Mutex::new(AdmissionState::default()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn within_window(&self) -> Duration {
        self.within_window
    }

    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    pub fn is_exempt(&self, addr: &IpAddr) -> bool {
        self.exempt.contains(addr)
    }

    /// Decide whether a request from `addr` may proceed
    pub fn check(&self, addr: IpAddr) -> Decision {
        if self.is_exempt(&addr) {
            return Decision::Exempt;
        }

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                error!("Admission state lock poisoned, applying fail mode {:?}", self.fail_mode);
                return self.unavailable();
            }
        };

        if state.blocked.contains(&addr) {
            return Decision::Reject {
                limit: self.max_requests,
                remaining: 0,
                reason: RejectReason::Blocked,
            };
        }

        let requests = state.counts.get(&addr).copied().unwrap_or(0).saturating_add(1);
        let remaining = self.max_requests.saturating_sub(requests);

        if requests >= self.max_requests {
            state.counts.remove(&addr);
            state.blocked.insert(addr);
            drop(state);

            info!(client = %addr, limit = self.max_requests, "Client exceeded rate limit, blocking");
            return Decision::Reject {
                limit: self.max_requests,
                remaining,
                reason: RejectReason::LimitReached,
            };
        }

        state.counts.insert(addr, requests);
        Decision::Allow {
            limit: self.max_requests,
            remaining,
        }
    }

    /// Decision for a request whose client address could not be determined
    pub fn unavailable(&self) -> Decision {
        match self.fail_mode {
            FailMode::Open => Decision::Unchecked,
            FailMode::Closed => Decision::Reject {
                limit: self.max_requests,
                remaining: 0,
                reason: RejectReason::Unavailable,
            },
        }
    }

    /// Clear the whole block list; returns how many addresses were released
    pub fn reset(&self) -> usize {
        let mut state = self.lock_state();
        let released = state.blocked.len();
        state.blocked.clear();
        released
    }

    /// Decay counts below the limit and block the rest
    pub fn sweep(&self) -> SweepReport {
        let mut state = self.lock_state();
        let AdmissionState { counts, blocked } = &mut *state;
        let mut report = SweepReport::default();

        counts.retain(|addr, requests| {
            if *requests < self.max_requests {
                report.decayed += 1;
            } else {
                blocked.insert(*addr);
                report.blocked += 1;
            }
            false
        });

        report
    }

    /// Current count for `addr` in the active window
    pub fn count(&self, addr: &IpAddr) -> Option<u32> {
        self.lock_state().counts.get(addr).copied()
    }

    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.lock_state().blocked.contains(addr)
    }

    pub fn blocked_count(&self) -> usize {
        self.lock_state().blocked.len()
    }

    /// Timer tasks recover a poisoned lock and clear the flag so request
    /// checks resume normally after the next tick.
    fn lock_state(&self) -> MutexGuard<'_, AdmissionState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                self.state.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}
