//! Reachability probing for the remote peer.
//!
//! Two probe strengths: a bare TCP connect (is the port open at all) and the
//! remote executor's authenticated handshake (is the service actually
//! usable). The stricter check is preferred whenever an executor with
//! credentials is available. Probes are stateless per call and never error —
//! every failure mode maps to `false`.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{PeerConfig, ProbeConfig};
use crate::executor::RemoteExecutor;

#[derive(Debug, Clone)]
pub struct LivenessProber {
    config: ProbeConfig,
}

impl LivenessProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// `true` iff a TCP connection to `host:port` is established within the
    /// connect timeout. Refused, timed out, and unresolvable all yield
    /// `false`.
    pub async fn is_reachable(&self, host: &str, port: u16) -> bool {
        let addr = format!("{}:{}", host, port);
        let deadline = Duration::from_secs(self.config.connect_timeout_secs);
        match timeout(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("[Liveness] connect to {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!(
                    "[Liveness] connect to {} timed out after {}s",
                    addr, self.config.connect_timeout_secs
                );
                false
            }
        }
    }

    /// Probe the peer, preferring the executor's authenticated handshake
    /// when credentials are configured, falling back to a bare port check.
    pub async fn check(&self, peer: &PeerConfig, remote: Option<&dyn RemoteExecutor>) -> bool {
        match remote {
            Some(executor) if !peer.user.is_empty() => match executor.handshake().await {
                Ok(()) => true,
                Err(e) => {
                    debug!("[Liveness] handshake with {} failed: {}", peer.host, e);
                    false
                }
            },
            _ => self.is_reachable(&peer.host, peer.port).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn probe() -> LivenessProber {
        LivenessProber::new(ProbeConfig {
            connect_timeout_secs: 1,
            execution_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_reachable_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe().is_reachable("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_unreachable_when_refused() {
        // Bind then drop to get a port that is almost certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!probe().is_reachable("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_unreachable_on_bad_hostname() {
        assert!(
            !probe()
                .is_reachable("this-host-does-not-exist.invalid", 22)
                .await
        );
    }

    #[tokio::test]
    async fn test_check_falls_back_to_port_probe_without_credentials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = PeerConfig {
            host: "127.0.0.1".to_string(),
            port,
            user: String::new(),
            mac_address: None,
        };
        assert!(probe().check(&peer, None).await);
    }
}
