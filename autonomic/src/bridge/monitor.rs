//! Background bridge monitor.
//!
//! Probes the peer on a fixed interval, records the result in the shared
//! bridge state, optionally wakes an unreachable peer, and persists a status
//! snapshot for dashboards. Runs on its own tokio task so the multi-minute
//! wake sequence never blocks a dispatch caller. Monitor probes never trip
//! the dispatch circuit breaker.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::breaker::{BridgeStateSnapshot, CircuitBreaker};
use super::liveness::LivenessProber;
use super::wake::WakeCoordinator;
use crate::config::ConfigStore;

#[derive(Serialize)]
struct MonitorSnapshot {
    last_check: DateTime<Utc>,
    wake_on_lan_enabled: bool,
    #[serde(flatten)]
    bridge: BridgeStateSnapshot,
}

pub struct BridgeMonitor {
    store: Arc<ConfigStore>,
    breaker: Arc<CircuitBreaker>,
    status_path: PathBuf,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeMonitor {
    pub fn new(store: Arc<ConfigStore>, breaker: Arc<CircuitBreaker>) -> Self {
        let status_path = store.state_dir().join("bridge_status.json");
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            breaker,
            status_path,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Start the background loop. Returns false if already running.
    pub fn start(self: Arc<Self>) -> bool {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return false;
        }
        let monitor = Arc::clone(&self);
        let mut shutdown_rx = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(async move {
            info!("[Monitor] bridge status monitor started");
            loop {
                let interval_secs = monitor.store.routing().bridge.monitor.check_interval_secs;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {
                        monitor.check_once().await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("[Monitor] bridge status monitor stopped");
                        break;
                    }
                }
            }
        }));
        true
    }

    /// Stop the background loop and wait for it to exit.
    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            if let Err(e) = handle.await {
                error!("[Monitor] monitor task failed to join: {}", e);
            }
        }
    }

    /// One reachability check: probe, record, wake when configured, persist
    /// the snapshot. Returns whether the peer ended up reachable.
    pub async fn check_once(&self) -> bool {
        let routing = self.store.routing();
        let prober = LivenessProber::new(routing.bridge.probe.clone());
        let mut reachable = prober.is_reachable(&routing.peer.host, routing.peer.port).await;
        self.breaker.record_probe(reachable);

        if !reachable && routing.wake_on_lan_enabled {
            info!("[Monitor] {} unreachable, attempting wake", routing.peer.host);
            self.breaker.record_wake_attempt();
            let wake = WakeCoordinator::new(routing.bridge.wake.clone());
            reachable = wake.wake_and_wait(&routing.peer, &prober, None).await;
            self.breaker.record_probe(reachable);
        }

        self.persist_snapshot(routing.wake_on_lan_enabled);
        reachable
    }

    fn persist_snapshot(&self, wake_on_lan_enabled: bool) {
        let snapshot = MonitorSnapshot {
            last_check: Utc::now(),
            wake_on_lan_enabled,
            bridge: self.breaker.snapshot(),
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.status_path, content) {
                    warn!(
                        "[Monitor] failed to write {}: {}",
                        self.status_path.display(),
                        e
                    );
                }
            }
            Err(e) => warn!("[Monitor] failed to serialize bridge status: {}", e),
        }
    }
}
