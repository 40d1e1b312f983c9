use serde::{Deserialize, Serialize};

/// Address and credentials of the remote peer (the dev machine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Hostname or IP of the peer.
    pub host: String,
    /// Control-channel port.
    pub port: u16,
    /// User for the authenticated control channel. Empty disables the
    /// stricter handshake probe.
    pub user: String,
    /// Hardware (MAC) address for wake-on-LAN. `None` makes wake a no-op.
    #[serde(default)]
    pub mac_address: Option<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 22,
            user: "dev".to_string(),
            mac_address: None,
        }
    }
}

/// Liveness probe and remote execution timeouts. Both are load-bearing
/// correctness parameters: too short causes false "unreachable" verdicts,
/// too long stalls local fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Connect timeout for reachability probes, in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound on a single remote execution, in seconds.
    pub execution_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            execution_timeout_secs: 30,
        }
    }
}

/// Wake-on-LAN retry schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Probe attempts after the wake packet is sent.
    pub max_retries: u32,
    /// Sleep before each probe attempt, in seconds.
    pub retry_delay_secs: u64,
    /// Initial boot allowance after the wake packet, in seconds.
    pub grace_period_secs: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 15,
            grace_period_secs: 20,
        }
    }
}

/// Circuit-breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive remote failures before remote dispatch is disabled.
    pub failure_threshold: u32,
    /// Length of the disabled window, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 600,
        }
    }
}

/// Background bridge-monitor cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between background reachability checks.
    pub check_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
        }
    }
}

/// Bridge subsystem tuning, nested under the routing document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Process-wide routing configuration, persisted as `routing_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Score at or above which tasks are delegated to the peer.
    pub delegation_threshold: f64,
    /// Remote peer address and credentials.
    pub peer: PeerConfig,
    /// Whether local execution is available.
    pub local_enabled: bool,
    /// Whether remote delegation is considered at all. When false, every
    /// task routes local regardless of score.
    pub remote_enabled: bool,
    /// Whether an unreachable peer may be woken before falling back.
    pub wake_on_lan_enabled: bool,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            delegation_threshold: 0.7,
            peer: PeerConfig::default(),
            local_enabled: true,
            remote_enabled: true,
            wake_on_lan_enabled: false,
            bridge: BridgeConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(0.0..=1.0).contains(&self.delegation_threshold) {
            errors.push(format!(
                "delegation_threshold must be between 0.0 and 1.0, got {}",
                self.delegation_threshold
            ));
        }
        if self.peer.host.is_empty() {
            errors.push("peer.host must not be empty".to_string());
        }
        if self.peer.port == 0 {
            errors.push("peer.port must be non-zero".to_string());
        }
        if self.bridge.probe.connect_timeout_secs == 0 {
            errors.push("bridge.probe.connect_timeout_secs must be non-zero".to_string());
        }
        if self.bridge.probe.execution_timeout_secs == 0 {
            errors.push("bridge.probe.execution_timeout_secs must be non-zero".to_string());
        }
        if self.bridge.breaker.failure_threshold == 0 {
            errors.push("bridge.breaker.failure_threshold must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply `AUTONOMIC_*` environment overrides on top of the persisted
    /// document. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AUTONOMIC_PEER_HOST") {
            if !v.is_empty() {
                self.peer.host = v;
            }
        }
        if let Ok(v) = std::env::var("AUTONOMIC_PEER_PORT") {
            if let Ok(port) = v.parse() {
                self.peer.port = port;
            }
        }
        if let Ok(v) = std::env::var("AUTONOMIC_PEER_USER") {
            if !v.is_empty() {
                self.peer.user = v;
            }
        }
        if let Ok(v) = std::env::var("AUTONOMIC_PEER_MAC") {
            if !v.is_empty() {
                self.peer.mac_address = Some(v);
            }
        }
        if let Ok(v) = std::env::var("AUTONOMIC_DELEGATION_THRESHOLD") {
            if let Ok(threshold) = v.parse::<f64>() {
                if (0.0..=1.0).contains(&threshold) {
                    self.delegation_threshold = threshold;
                }
            }
        }
    }
}

/// Weight table of the complexity scorer. Every signal is a tunable so
/// operators can retune routing empirically without recompiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerWeights {
    /// Weight of the normalized text-length signal.
    pub length_weight: f64,
    /// Character count at which the length signal saturates.
    pub length_scale: usize,
    /// Weight of the normalized word-count signal.
    pub token_weight: f64,
    /// Word count at which the token signal saturates.
    pub token_scale: usize,
    /// Contribution of each distinct heavy-keyword match.
    pub heavy_keyword_weight: f64,
    /// Upper bound on the total heavy-keyword contribution.
    pub heavy_keyword_cap: f64,
    /// Penalty for each distinct light-keyword match.
    pub light_keyword_penalty: f64,
    /// Upper bound on the total light-keyword penalty.
    pub light_keyword_cap: f64,
    /// Contribution of each distinct domain-keyword match.
    pub domain_keyword_weight: f64,
    /// Upper bound on the total domain-keyword contribution.
    pub domain_keyword_cap: f64,
    /// Weight of the rescaled semantic-similarity signal.
    pub semantic_weight: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            length_weight: 0.15,
            length_scale: 500,
            token_weight: 0.15,
            token_scale: 50,
            heavy_keyword_weight: 0.25,
            heavy_keyword_cap: 0.45,
            light_keyword_penalty: 0.15,
            light_keyword_cap: 0.30,
            domain_keyword_weight: 0.20,
            domain_keyword_cap: 0.35,
            semantic_weight: 0.20,
        }
    }
}

fn default_heavy_keywords() -> Vec<String> {
    [
        "optimize",
        "optimization",
        "analyze",
        "analysis",
        "summarize",
        "plan",
        "research",
        "implement",
        "generate",
        "build",
        "develop",
        "compile",
        "comprehensive",
        "detailed",
        "complex",
        "troubleshoot",
        "refactor",
        "debug",
        "benchmark",
        "algorithm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_light_keywords() -> Vec<String> {
    [
        "list", "show", "echo", "status", "help", "simple", "test", "example", "what time",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_domain_keywords() -> Vec<String> {
    [
        "container",
        "docker",
        "kubernetes",
        "orchestration",
        "microservice",
        "architecture",
        "performance",
        "security",
        "infrastructure",
        "deployment",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scorer configuration, persisted as `semantic_config.json`.
///
/// `threshold` mirrors `RoutingConfig::delegation_threshold`; the two are
/// kept in sync by the config store, and on load this document's value wins
/// if they disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// When false, every task scores 0.0 and therefore routes local.
    pub enabled: bool,
    /// Delegation threshold mirror.
    pub threshold: f64,
    #[serde(default)]
    pub weights: ScorerWeights,
    #[serde(default = "default_heavy_keywords")]
    pub heavy_keywords: Vec<String>,
    #[serde(default = "default_light_keywords")]
    pub light_keywords: Vec<String>,
    #[serde(default = "default_domain_keywords")]
    pub domain_keywords: Vec<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
            weights: ScorerWeights::default(),
            heavy_keywords: default_heavy_keywords(),
            light_keywords: default_light_keywords(),
            domain_keywords: default_domain_keywords(),
        }
    }
}
