//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and `serde(default)`
//! 2. **Config file**: TOML file named by the `HUB_CONFIG` env var
//! 3. **Environment variables**: `HUB__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP server settings (bind address, concurrency)
//! - [`FetcherConfig`]: outbound HTTP client limits and retries
//! - [`RouterConfig`] / [`DistributorConfig`]: fan-out deadline and width
//! - [`EnforcerConfig`] / [`ScoringConfig`]: voting, demotion and score weights
//! - [`IndexConfig`]: qualified-node index key layout
//! - `seed_nodes`: nodes loaded into the in-memory registry at startup
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 8080
//!
//! [distributor]
//! node_count = 3
//!
//! [[seed_nodes]]
//! address = "0x1111111111111111111111111111111111111111"
//! endpoint = "http://localhost:8081"
//! version = "1.2.0"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};
use url::Url;

pub use crate::{
    distributor::DistributorConfig,
    enforcer::{EnforcerConfig, ScoringConfig},
    fetch::FetcherConfig,
    index::IndexConfig,
    router::RouterConfig,
};
use crate::types::Node;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of in-flight client requests. Defaults to `100`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3030
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Prometheus metrics configuration. When enabled the server serves `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive. Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration.
///
/// Loaded with the `HUB` prefix for environment overrides using `__` as a
/// separator, e.g. `HUB__DISTRIBUTOR__NODE_COUNT=5`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment (e.g., "development", "production"). Defaults to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub distributor: DistributorConfig,

    #[serde(default)]
    pub enforcer: EnforcerConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub index: IndexConfig,

    /// Nodes registered in the in-memory repository at startup.
    #[serde(default)]
    pub seed_nodes: Vec<Node>,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            fetcher: FetcherConfig::default(),
            router: RouterConfig::default(),
            distributor: DistributorConfig::default(),
            enforcer: EnforcerConfig::default(),
            scoring: ScoringConfig::default(),
            index: IndexConfig::default(),
            seed_nodes: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; defaults and environment apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 3030)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", true)?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("HUB").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml`, or the path in
    /// `HUB_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("HUB_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }
        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }
        if self.fetcher.concurrent_limit == 0 || self.fetcher.max_attempts == 0 {
            return Err("Fetcher concurrency and attempts must be greater than 0".to_string());
        }
        if self.router.fanout_timeout_ms == 0 {
            return Err("Fan-out timeout must be greater than 0".to_string());
        }
        if self.index.key_prefix.is_empty() {
            return Err("Index key prefix must not be empty".to_string());
        }
        self.distributor.validate()?;
        self.enforcer.validate()?;

        let mut seen = HashSet::new();
        for node in &self.seed_nodes {
            if !seen.insert(node.address) {
                return Err(format!("Duplicate seed node {}", node.address));
            }
            if !Url::parse(&node.endpoint).is_ok_and(|url| url.scheme().starts_with("http")) {
                return Err(format!(
                    "Invalid endpoint for seed node {}: {}",
                    node.address, node.endpoint
                ));
            }
        }

        Ok(())
    }
}
