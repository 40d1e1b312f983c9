// Autonomic task-routing core
// Decides whether home-lab diagnostic tasks run on the constrained local
// host or get delegated to a wake-on-LAN capable dev machine peer.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod scorer;

pub use bridge::{BridgeMonitor, BridgeStateSnapshot, CircuitBreaker, LivenessProber, WakeCoordinator};
pub use config::{ConfigStore, PeerConfig, RoutingConfig, ScorerConfig};
pub use dispatcher::{BridgeStatus, Dispatcher};
pub use error::{DispatchError, ExecutorError, SemanticError};
pub use executor::{LocalExecutor, RemoteExecutor, ShellLocalExecutor, SshRemoteExecutor};
pub use outcome::{Destination, DispatchStats, LogRecord, OutcomeLog};
pub use scorer::{SemanticBackend, TaskScorer};
