//! Shared stub executors and fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use autonomic::config::RoutingConfig;
use autonomic::{ConfigStore, ExecutorError, LocalExecutor, RemoteExecutor};

/// Local executor stub: echoes the task or fails on demand.
pub struct StubLocal {
    fail: bool,
    pub calls: AtomicUsize,
}

impl StubLocal {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LocalExecutor for StubLocal {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ExecutorError::Execution("local model crashed".to_string()))
        } else {
            Ok(format!("pi handled: {}", task))
        }
    }
}

/// Remote executor stub with scriptable reachability.
///
/// The handshake fails for the first `unreachable_for` calls, then succeeds;
/// execution either succeeds or always fails.
pub struct StubRemote {
    unreachable_for: usize,
    fail_execution: bool,
    pub handshake_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
}

impl StubRemote {
    fn new(unreachable_for: usize, fail_execution: bool) -> Self {
        Self {
            unreachable_for,
            fail_execution,
            handshake_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
        }
    }

    pub fn reachable() -> Self {
        Self::new(0, false)
    }

    pub fn unreachable() -> Self {
        Self::new(usize::MAX, false)
    }

    pub fn reachable_after(failed_probes: usize) -> Self {
        Self::new(failed_probes, false)
    }

    pub fn failing_execution() -> Self {
        Self::new(0, true)
    }
}

#[async_trait]
impl RemoteExecutor for StubRemote {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_execution {
            Err(ExecutorError::Execution("remote agent errored".to_string()))
        } else {
            Ok(format!("dev machine handled: {}", task))
        }
    }

    async fn handshake(&self) -> Result<(), ExecutorError> {
        let call = self.handshake_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.unreachable_for {
            Err(ExecutorError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Seed a state directory with a customized routing document and open the
/// store over it.
pub fn setup_store(mutate: impl FnOnce(&mut RoutingConfig)) -> (TempDir, Arc<ConfigStore>) {
    let dir = tempdir().unwrap();
    let mut routing = RoutingConfig::default();
    mutate(&mut routing);
    std::fs::write(
        dir.path().join("routing_config.json"),
        serde_json::to_string_pretty(&routing).unwrap(),
    )
    .unwrap();
    let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
    (dir, store)
}

/// Wake schedule with no real sleeping, for tests.
pub fn instant_wake(routing: &mut RoutingConfig) {
    routing.bridge.wake.max_retries = 1;
    routing.bridge.wake.retry_delay_secs = 0;
    routing.bridge.wake.grace_period_secs = 0;
}

/// A task heavy enough to clear the default delegation threshold.
pub const HEAVY_TASK: &str = "Please provide a comprehensive analysis of network security \
     vulnerabilities and generate detailed optimization recommendations";

pub const LIGHT_TASK: &str = "show status";
