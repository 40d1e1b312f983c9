//! Wake-on-LAN coordination.
//!
//! Builds the standard magic packet (six `0xFF` bytes followed by the target
//! MAC repeated sixteen times) and broadcasts it over UDP port 9, then waits
//! out a boot grace period and re-polls reachability a bounded number of
//! times. The whole sequence can take minutes; callers must not run it on a
//! latency-sensitive path.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{info, warn};

use super::liveness::LivenessProber;
use crate::config::{PeerConfig, WakeConfig};
use crate::error::DispatchError;
use crate::executor::RemoteExecutor;

const WOL_PORT: u16 = 9;

#[derive(Debug, Clone)]
pub struct WakeCoordinator {
    config: WakeConfig,
}

impl WakeCoordinator {
    pub fn new(config: WakeConfig) -> Self {
        Self { config }
    }

    /// Send a single magic packet to the broadcast address.
    pub async fn send_magic_packet(&self, mac_address: &str) -> Result<(), DispatchError> {
        let mac = parse_mac(mac_address).ok_or_else(|| {
            DispatchError::Config(format!("invalid hardware address: {}", mac_address))
        })?;
        let packet = magic_packet(mac);

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&packet, ("255.255.255.255", WOL_PORT))
            .await?;
        info!("[Wake] magic packet sent to {}", mac_address);
        Ok(())
    }

    /// Wake the peer and wait for it to come up.
    ///
    /// No-op returning `false` when no hardware address is configured. A
    /// transmission failure is logged and treated as "wake attempted, no
    /// response" — the retry loop still runs and will keep failing the
    /// reachability check.
    pub async fn wake_and_wait(
        &self,
        peer: &PeerConfig,
        prober: &LivenessProber,
        remote: Option<&dyn RemoteExecutor>,
    ) -> bool {
        let Some(mac_address) = peer.mac_address.as_deref() else {
            warn!("[Wake] no hardware address configured, cannot wake {}", peer.host);
            return false;
        };

        if let Err(e) = self.send_magic_packet(mac_address).await {
            warn!("[Wake] failed to send magic packet: {}", e);
        }

        sleep(Duration::from_secs(self.config.grace_period_secs)).await;

        for attempt in 1..=self.config.max_retries {
            info!(
                "[Wake] probe attempt {}/{} for {}",
                attempt, self.config.max_retries, peer.host
            );
            sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
            if prober.check(peer, remote).await {
                info!("[Wake] {} is now online", peer.host);
                return true;
            }
        }

        warn!(
            "[Wake] {} did not respond after {} attempts",
            peer.host, self.config.max_retries
        );
        false
    }
}

/// Parse `AA:BB:CC:DD:EE:FF` (or `-`-separated) into raw bytes.
pub fn parse_mac(mac: &str) -> Option<[u8; 6]> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(bytes)
}

fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for repeat in 0..16 {
        let offset = 6 + repeat * 6;
        packet[offset..offset + 6].copy_from_slice(&mac);
    }
    packet
}
