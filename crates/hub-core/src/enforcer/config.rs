use semver::Version;
use serde::{Deserialize, Serialize};

/// Enforcer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcerConfig {
    /// Epoch invalid count at which a node leaves the qualified index and is
    /// submitted for demotion (default: 3)
    #[serde(default = "default_demotion_threshold")]
    pub demotion_threshold: u64,

    /// Platforms whose activity content may change after indexing; their
    /// actions are ignored when comparing payloads.
    #[serde(default = "default_mutable_platforms")]
    pub mutable_platforms: Vec<String>,

    /// Minimum node software version; older nodes become `outdated`.
    #[serde(default = "default_min_node_version")]
    pub min_node_version: String,

    /// Concurrent worker-status probes during an epoch pass (default: 32)
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// Activities re-fetched per partial cross-check (default: 3)
    #[serde(default = "default_partial_sample_size")]
    pub partial_sample_size: usize,

    /// Secondary nodes consulted per partial cross-check (default: 2)
    #[serde(default = "default_partial_node_count")]
    pub partial_node_count: usize,

    /// Store key carrying the current epoch; also the notification channel.
    #[serde(default = "default_epoch_key")]
    pub epoch_key: String,
}

fn default_demotion_threshold() -> u64 {
    3
}

fn default_mutable_platforms() -> Vec<String> {
    vec!["Farcaster".to_string()]
}

fn default_min_node_version() -> String {
    "1.0.0".to_string()
}

fn default_probe_concurrency() -> usize {
    32
}

fn default_partial_sample_size() -> usize {
    3
}

fn default_partial_node_count() -> usize {
    2
}

fn default_epoch_key() -> String {
    "epoch".to_string()
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            demotion_threshold: default_demotion_threshold(),
            mutable_platforms: default_mutable_platforms(),
            min_node_version: default_min_node_version(),
            probe_concurrency: default_probe_concurrency(),
            partial_sample_size: default_partial_sample_size(),
            partial_node_count: default_partial_node_count(),
            epoch_key: default_epoch_key(),
        }
    }
}

impl EnforcerConfig {
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.demotion_threshold == 0 {
            return Err("enforcer.demotion_threshold must be greater than 0".to_string());
        }
        if self.probe_concurrency == 0 {
            return Err("enforcer.probe_concurrency must be greater than 0".to_string());
        }
        if self.epoch_key.is_empty() {
            return Err("enforcer.epoch_key must not be empty".to_string());
        }
        self.min_version().map(|_| ())
    }

    /// # Errors
    ///
    /// Returns a description if `min_node_version` is not semver.
    pub fn min_version(&self) -> Result<Version, String> {
        parse_version(&self.min_node_version).ok_or_else(|| {
            format!("enforcer.min_node_version {:?} is not semver", self.min_node_version)
        })
    }
}

/// Parses a node version, tolerating a leading `v`.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}
