use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use super::types::{RoutingConfig, ScorerConfig};
use crate::error::DispatchError;

struct Inner {
    routing: RoutingConfig,
    scorer: ScorerConfig,
}

/// On-disk configuration store.
///
/// Owns the load-mutate-persist sequence for both configuration documents
/// under a single lock so concurrent setters cannot interleave writes.
pub struct ConfigStore {
    state_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl ConfigStore {
    /// Open the store, creating the state directory and default documents
    /// when absent.
    pub fn open<P: AsRef<Path>>(state_dir: P) -> Result<Self, DispatchError> {
        let state_dir = state_dir.as_ref().to_path_buf();
        fs::create_dir_all(&state_dir)?;

        let routing_path = state_dir.join("routing_config.json");
        let scorer_path = state_dir.join("semantic_config.json");

        let mut routing = match load_document::<RoutingConfig>(&routing_path)? {
            Some(config) => config,
            None => {
                info!(
                    "[Config] creating default routing config at {}",
                    routing_path.display()
                );
                RoutingConfig::default()
            }
        };
        routing.apply_env_overrides();
        if let Err(errors) = routing.validate() {
            return Err(DispatchError::Config(errors.join("; ")));
        }

        let scorer = match load_document::<ScorerConfig>(&scorer_path)? {
            Some(config) => config,
            None => {
                info!(
                    "[Config] creating default scorer config at {}",
                    scorer_path.display()
                );
                let mut config = ScorerConfig::default();
                config.threshold = routing.delegation_threshold;
                config
            }
        };
        if !(0.0..=1.0).contains(&scorer.threshold) {
            return Err(DispatchError::Config(format!(
                "scorer threshold must be between 0.0 and 1.0, got {}",
                scorer.threshold
            )));
        }

        // The scorer document is the one mutated at runtime; it wins when
        // the two thresholds disagree after an out-of-band edit.
        if (scorer.threshold - routing.delegation_threshold).abs() > f64::EPSILON {
            info!(
                "[Config] threshold mismatch (routing {:.2}, scorer {:.2}); using scorer value",
                routing.delegation_threshold, scorer.threshold
            );
            routing.delegation_threshold = scorer.threshold;
        }

        let store = Self {
            state_dir,
            inner: Mutex::new(Inner { routing, scorer }),
        };
        store.persist_locked(&store.inner.lock().unwrap())?;
        Ok(store)
    }

    /// Directory holding every persisted artifact (configs, outcome log,
    /// bridge status snapshot).
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Snapshot of the routing configuration.
    pub fn routing(&self) -> RoutingConfig {
        self.inner.lock().unwrap().routing.clone()
    }

    /// Snapshot of the scorer configuration.
    pub fn scorer(&self) -> ScorerConfig {
        self.inner.lock().unwrap().scorer.clone()
    }

    /// Set the delegation threshold and persist both documents.
    pub fn set_threshold(&self, value: f64) -> Result<(), DispatchError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DispatchError::InvalidThreshold(value));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.routing.delegation_threshold = value;
        inner.scorer.threshold = value;
        self.persist_locked(&inner)?;
        info!("[Config] delegation threshold set to {:.2}", value);
        Ok(())
    }

    /// Enable or disable the scorer and persist.
    pub fn set_scorer_enabled(&self, enabled: bool) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.scorer.enabled = enabled;
        self.persist_locked(&inner)?;
        info!("[Config] scorer enabled set to {}", enabled);
        Ok(())
    }

    /// Toggle wake-on-LAN and persist. Returns the new value.
    pub fn set_wake_on_lan(&self, enabled: bool) -> Result<bool, DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.routing.wake_on_lan_enabled = enabled;
        self.persist_locked(&inner)?;
        info!("[Config] wake-on-lan set to {}", enabled);
        Ok(enabled)
    }

    /// Enable or disable remote delegation and persist.
    pub fn set_remote_enabled(&self, enabled: bool) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.routing.remote_enabled = enabled;
        self.persist_locked(&inner)?;
        info!("[Config] remote delegation set to {}", enabled);
        Ok(())
    }

    fn routing_path(&self) -> PathBuf {
        self.state_dir.join("routing_config.json")
    }

    fn scorer_path(&self) -> PathBuf {
        self.state_dir.join("semantic_config.json")
    }

    fn persist_locked(&self, inner: &Inner) -> Result<(), DispatchError> {
        write_document(&self.routing_path(), &inner.routing)?;
        write_document(&self.scorer_path(), &inner.scorer)?;
        Ok(())
    }
}

fn load_document<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, DispatchError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(
                "[Config] failed to parse {}: {}; keeping file, using defaults",
                path.display(),
                e
            );
            Ok(None)
        }
    }
}

fn write_document<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), DispatchError> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| DispatchError::Config(format!("failed to serialize {}: {}", path.display(), e)))?;
    fs::write(path, content)?;
    Ok(())
}
