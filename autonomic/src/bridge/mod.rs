//! Remote-peer availability management: reachability probing, wake-on-LAN,
//! failure-driven circuit breaking, and the optional background monitor.

pub mod breaker;
pub mod liveness;
pub mod monitor;
pub mod wake;

pub use breaker::{BridgeStateSnapshot, CircuitBreaker};
pub use liveness::LivenessProber;
pub use monitor::BridgeMonitor;
pub use wake::WakeCoordinator;
