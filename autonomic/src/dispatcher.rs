//! Dispatch decision engine.
//!
//! The orchestrator of the routing core: scores an incoming task, decides
//! local vs. remote (force flags, remote-enabled flag, circuit breaker,
//! score-vs-threshold, in that order), probes and optionally wakes the peer,
//! executes through the injected executor collaborators, falls back to local
//! on any remote failure, and records every decision and outcome in the
//! append-only log.
//!
//! Remote transport errors, timeouts, and remote-side execution failures are
//! all absorbed into the local fallback — `dispatch` only returns `Err` for
//! caller-usage errors (conflicting force flags). Local failures are the
//! floor: they surface as an explicit `[LOCAL ERROR]`-tagged result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::breaker::BridgeStateSnapshot;
use crate::bridge::{BridgeMonitor, CircuitBreaker, LivenessProber, WakeCoordinator};
use crate::config::ConfigStore;
use crate::error::{DispatchError, ExecutorError};
use crate::executor::{LocalExecutor, RemoteExecutor};
use crate::outcome::{
    task_preview, Destination, DispatchStats, LogRecord, OutcomeLog, RecordKind,
};
use crate::scorer::{SemanticBackend, TaskScorer};

/// Bridge status report for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// `"connected"` or `"disconnected"`.
    pub status: String,
    pub wake_on_lan_enabled: bool,
    #[serde(flatten)]
    pub state: BridgeStateSnapshot,
}

/// The task-routing core. Constructed once at process start with injected
/// executor collaborators and shared via `Arc`.
pub struct Dispatcher {
    store: Arc<ConfigStore>,
    scorer: TaskScorer,
    breaker: Arc<CircuitBreaker>,
    prober: LivenessProber,
    wake: WakeCoordinator,
    log: Arc<OutcomeLog>,
    local: Arc<dyn LocalExecutor>,
    remote: Arc<dyn RemoteExecutor>,
}

struct DispatchContext<'a> {
    id: String,
    task: &'a str,
    score: f64,
    threshold: f64,
    started: Instant,
}

impl DispatchContext<'_> {
    fn record(
        &self,
        event: RecordKind,
        routed_to: Destination,
        reason: impl Into<String>,
    ) -> LogRecord {
        LogRecord {
            timestamp: chrono::Utc::now(),
            event,
            id: self.id.clone(),
            task: task_preview(self.task),
            score: self.score,
            threshold: self.threshold,
            routed_to,
            reason: reason.into(),
            success: None,
            response_length: None,
            error: None,
            fallback_used: false,
            duration_ms: None,
        }
    }
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        local: Arc<dyn LocalExecutor>,
        remote: Arc<dyn RemoteExecutor>,
    ) -> Result<Self, DispatchError> {
        let scorer = TaskScorer::new(store.clone());
        Self::build(store, scorer, local, remote)
    }

    /// Construct with a semantic backend wired into the scorer.
    pub fn with_semantic_backend(
        store: Arc<ConfigStore>,
        local: Arc<dyn LocalExecutor>,
        remote: Arc<dyn RemoteExecutor>,
        backend: Arc<dyn SemanticBackend>,
    ) -> Result<Self, DispatchError> {
        let scorer = TaskScorer::with_backend(store.clone(), backend);
        Self::build(store, scorer, local, remote)
    }

    fn build(
        store: Arc<ConfigStore>,
        scorer: TaskScorer,
        local: Arc<dyn LocalExecutor>,
        remote: Arc<dyn RemoteExecutor>,
    ) -> Result<Self, DispatchError> {
        let routing = store.routing();
        let breaker = Arc::new(CircuitBreaker::new(routing.bridge.breaker.clone()));
        let prober = LivenessProber::new(routing.bridge.probe.clone());
        let wake = WakeCoordinator::new(routing.bridge.wake.clone());
        let log = Arc::new(OutcomeLog::open(store.state_dir().join("recall_log.jsonl"))?);
        Ok(Self {
            store,
            scorer,
            breaker,
            prober,
            wake,
            log,
            local,
            remote,
        })
    }

    /// Score a task without dispatching it.
    pub fn score(&self, text: &str) -> f64 {
        self.scorer.score(text)
    }

    /// Route and execute a task. The returned string is tagged with the
    /// executor that actually produced it (`[LOCAL]`, `[REMOTE]`, or
    /// `[LOCAL ERROR]`) so callers can assert on routing without parsing
    /// prose.
    ///
    /// May block for a remote round-trip (bounded by the execution timeout)
    /// or, when wake-on-LAN kicks in, for minutes — spawn it when the caller
    /// cannot tolerate that.
    pub async fn dispatch(
        &self,
        task_text: &str,
        force_local: bool,
        force_remote: bool,
    ) -> Result<String, DispatchError> {
        if force_local && force_remote {
            return Err(DispatchError::ConflictingForce);
        }

        let routing = self.store.routing();
        let ctx = DispatchContext {
            id: Uuid::new_v4().to_string(),
            task: task_text,
            score: self.scorer.score(task_text),
            threshold: routing.delegation_threshold,
            started: Instant::now(),
        };

        // The reason names the constraint that actually decided the route.
        let (destination, reason) = if force_local {
            (Destination::Local, "forced local execution".to_string())
        } else if force_remote {
            (Destination::Remote, "forced remote execution".to_string())
        } else if ctx.score < ctx.threshold {
            (
                Destination::Local,
                format!("score {:.2} < threshold {:.2}", ctx.score, ctx.threshold),
            )
        } else if !routing.remote_enabled {
            (
                Destination::Local,
                "remote execution disabled in config".to_string(),
            )
        } else if self.breaker.is_remote_disabled() {
            (
                Destination::Local,
                "remote delegation temporarily disabled".to_string(),
            )
        } else {
            (
                Destination::Remote,
                format!("score {:.2} >= threshold {:.2}", ctx.score, ctx.threshold),
            )
        };

        info!(
            "[Dispatch] {} -> {} ({})",
            ctx.id,
            destination,
            reason
        );
        self.append(ctx.record(RecordKind::Decision, destination, reason.clone()));

        let result = match destination {
            Destination::Remote => self.run_remote(&ctx).await,
            Destination::Local => self.run_local(&ctx, reason, false).await,
        };
        Ok(result)
    }

    async fn run_remote(&self, ctx: &DispatchContext<'_>) -> String {
        let routing = self.store.routing();

        // A forced remote dispatch still honors the kill switch: it degrades
        // to local rather than erroring.
        if !routing.remote_enabled {
            return self
                .run_local(ctx, "remote execution disabled in config", true)
                .await;
        }

        let reachable = self
            .prober
            .check(&routing.peer, Some(self.remote.as_ref()))
            .await;
        self.breaker.record_probe(reachable);

        if reachable {
            return match self.execute_remote(ctx).await {
                Ok(tagged) => tagged,
                Err(e) => {
                    self.run_local(
                        ctx,
                        format!("remote execution failed ({}), falling back to local", e),
                        true,
                    )
                    .await
                }
            };
        }

        warn!(
            "[Dispatch] peer {} unreachable (dispatch {})",
            routing.peer.host, ctx.id
        );
        self.breaker.record_failure();

        if routing.wake_on_lan_enabled {
            self.breaker.record_wake_attempt();
            let awake = self
                .wake
                .wake_and_wait(&routing.peer, &self.prober, Some(self.remote.as_ref()))
                .await;
            if awake {
                self.breaker.record_probe(true);
                return match self.execute_remote(ctx).await {
                    Ok(tagged) => tagged,
                    Err(e) => {
                        self.run_local(
                            ctx,
                            format!(
                                "remote execution failed after wake ({}), falling back to local",
                                e
                            ),
                            true,
                        )
                        .await
                    }
                };
            }
            return self
                .run_local(ctx, "peer did not respond to wake, falling back to local", true)
                .await;
        }

        self.run_local(ctx, "remote peer unreachable, falling back to local", true)
            .await
    }

    /// Execute on the peer with the configured timeout. Updates the breaker
    /// and, on success, records the outcome and returns the tagged result.
    async fn execute_remote(&self, ctx: &DispatchContext<'_>) -> Result<String, ExecutorError> {
        let timeout_secs = self.store.routing().bridge.probe.execution_timeout_secs;
        let result = match timeout(
            Duration::from_secs(timeout_secs),
            self.remote.execute(ctx.task),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(timeout_secs)),
        };

        match result {
            Ok(output) => {
                self.breaker.record_success();
                let output = output.trim().to_string();
                let mut record =
                    ctx.record(RecordKind::Outcome, Destination::Remote, "remote execution succeeded");
                record.success = Some(true);
                record.response_length = Some(output.len());
                record.duration_ms = Some(ctx.started.elapsed().as_millis() as u64);
                self.append(record);
                Ok(format!("[REMOTE] {}", output))
            }
            Err(e) => {
                warn!("[Dispatch] remote execution failed (dispatch {}): {}", ctx.id, e);
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    /// Execute locally. Local is the floor: failures become an explicit
    /// error-tagged result, never a further fallback.
    async fn run_local(
        &self,
        ctx: &DispatchContext<'_>,
        reason: impl Into<String>,
        fallback: bool,
    ) -> String {
        let reason = reason.into();
        let routing = self.store.routing();

        if !routing.local_enabled {
            let message = "local execution disabled in config";
            let mut record = ctx.record(RecordKind::Outcome, Destination::Local, reason);
            record.success = Some(false);
            record.error = Some(message.to_string());
            record.fallback_used = fallback;
            self.append(record);
            return format!("[LOCAL ERROR] {}", message);
        }

        match self.local.execute(ctx.task).await {
            Ok(output) => {
                let output = output.trim().to_string();
                let mut record = ctx.record(RecordKind::Outcome, Destination::Local, reason);
                record.success = Some(true);
                record.response_length = Some(output.len());
                record.fallback_used = fallback;
                record.duration_ms = Some(ctx.started.elapsed().as_millis() as u64);
                self.append(record);
                format!("[LOCAL] {}", output)
            }
            Err(e) => {
                warn!("[Dispatch] local execution failed (dispatch {}): {}", ctx.id, e);
                let mut record = ctx.record(RecordKind::Outcome, Destination::Local, reason);
                record.success = Some(false);
                record.error = Some(e.to_string());
                record.fallback_used = fallback;
                record.duration_ms = Some(ctx.started.elapsed().as_millis() as u64);
                self.append(record);
                format!("[LOCAL ERROR] local execution failed: {}", e)
            }
        }
    }

    /// On-demand liveness probe with a human-readable status message.
    pub async fn test_connectivity(&self) -> (bool, String) {
        let routing = self.store.routing();
        if !routing.remote_enabled {
            return (false, "remote execution disabled in config".to_string());
        }
        let reachable = self
            .prober
            .check(&routing.peer, Some(self.remote.as_ref()))
            .await;
        self.breaker.record_probe(reachable);
        if reachable {
            (true, "remote connection successful".to_string())
        } else {
            (
                false,
                format!(
                    "could not reach {}:{} within {}s",
                    routing.peer.host, routing.peer.port, routing.bridge.probe.connect_timeout_secs
                ),
            )
        }
    }

    /// Aggregate routing statistics over the whole log.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.log.stats(None)
    }

    /// Aggregate routing statistics over the trailing window.
    pub fn dispatch_stats_window(&self, window: chrono::Duration) -> DispatchStats {
        self.log.stats(Some(window))
    }

    /// The last `n` recorded outcomes, oldest first.
    pub fn recent_tasks(&self, n: usize) -> Vec<LogRecord> {
        self.log.recent(n)
    }

    /// Circuit-breaker / bridge state snapshot.
    pub fn bridge_status(&self) -> BridgeStatus {
        let state = self.breaker.snapshot();
        BridgeStatus {
            status: if state.connected {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            },
            wake_on_lan_enabled: self.store.routing().wake_on_lan_enabled,
            state,
        }
    }

    /// Set the delegation threshold; persisted immediately.
    pub fn set_threshold(&self, value: f64) -> Result<(), DispatchError> {
        self.store.set_threshold(value)
    }

    /// Enable or disable the scorer; persisted immediately.
    pub fn set_enabled(&self, value: bool) -> Result<(), DispatchError> {
        self.store.set_scorer_enabled(value)
    }

    /// Toggle wake-on-LAN; persisted immediately. Returns the new value.
    pub fn set_wake_on_lan(&self, enabled: bool) -> Result<bool, DispatchError> {
        self.store.set_wake_on_lan(enabled)
    }

    /// Spawn the background bridge monitor sharing this dispatcher's state.
    pub fn spawn_monitor(&self) -> Arc<BridgeMonitor> {
        let monitor = Arc::new(BridgeMonitor::new(self.store.clone(), self.breaker.clone()));
        monitor.clone().start();
        monitor
    }

    /// Append a log record; persistence failures must not break dispatch.
    fn append(&self, record: LogRecord) {
        if let Err(e) = self.log.append(&record) {
            warn!("[Dispatch] failed to append outcome record: {}", e);
        }
    }
}
