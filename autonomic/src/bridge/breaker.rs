//! Failure-driven circuit breaker over the bridge state.
//!
//! Two states. Closed: remote dispatch is allowed and every failure
//! increments a consecutive-failure counter. Open: once the counter reaches
//! the configured threshold, remote dispatch is force-disabled until a
//! cooldown window expires; the window is re-extended by further failures.
//! Re-closing is implicit — the first routing decision after expiry is
//! evaluated normally again.
//!
//! All counters live behind one mutex; concurrent dispatch calls race on
//! them otherwise.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BreakerConfig;

#[derive(Debug)]
struct BridgeState {
    connected: bool,
    last_probe_time: Option<DateTime<Utc>>,
    fallback_used: bool,
    consecutive_failures: u32,
    wake_attempts: u32,
    disabled_until: Option<Instant>,
}

/// Serializable snapshot of the bridge state for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStateSnapshot {
    pub connected: bool,
    pub last_probe_time: Option<DateTime<Utc>>,
    /// True when the most recent remote attempt degraded to local.
    pub fallback_used: bool,
    pub consecutive_failures: u32,
    pub wake_attempts: u32,
    /// Seconds remaining in the cooldown window, when remote dispatch is
    /// currently disabled.
    pub disabled_for_secs: Option<u64>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BridgeState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BridgeState {
                connected: false,
                last_probe_time: None,
                fallback_used: false,
                consecutive_failures: 0,
                wake_attempts: 0,
                disabled_until: None,
            }),
        }
    }

    /// A remote dispatch completed successfully: reset the failure counter
    /// and re-enable remote dispatch immediately.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if state.disabled_until.is_some() {
            info!("[Bridge] remote delegation re-enabled after successful dispatch");
        }
        state.consecutive_failures = 0;
        state.wake_attempts = 0;
        state.connected = true;
        state.fallback_used = false;
        state.disabled_until = None;
    }

    /// A remote dispatch failed or the peer was unreachable at dispatch
    /// time. Crossing the threshold opens the circuit for the cooldown
    /// window; every further failure extends it.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures += 1;
        state.connected = false;
        state.fallback_used = true;
        if state.consecutive_failures >= self.config.failure_threshold {
            state.disabled_until =
                Some(Instant::now() + Duration::from_secs(self.config.cooldown_secs));
            warn!(
                "[Bridge] remote delegation disabled for {}s after {} consecutive failures",
                self.config.cooldown_secs, state.consecutive_failures
            );
        }
    }

    /// Record a liveness probe result without touching the failure counter.
    /// Probes from the background monitor must not trip the breaker; only
    /// dispatch-path failures do.
    pub fn record_probe(&self, reachable: bool) {
        let mut state = self.state.lock().unwrap();
        state.connected = reachable;
        state.last_probe_time = Some(Utc::now());
    }

    /// Count a wake attempt (reset on the next successful dispatch).
    pub fn record_wake_attempt(&self) {
        self.state.lock().unwrap().wake_attempts += 1;
    }

    /// `true` while the cooldown window is active.
    pub fn is_remote_disabled(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.disabled_until {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    pub fn snapshot(&self) -> BridgeStateSnapshot {
        let state = self.state.lock().unwrap();
        let disabled_for_secs = state.disabled_until.and_then(|until| {
            let now = Instant::now();
            if now < until {
                Some((until - now).as_secs())
            } else {
                None
            }
        });
        BridgeStateSnapshot {
            connected: state.connected,
            last_probe_time: state.last_probe_time,
            fallback_used: state.fallback_used,
            consecutive_failures: state.consecutive_failures,
            wake_attempts: state.wake_attempts,
            disabled_for_secs,
        }
    }
}
