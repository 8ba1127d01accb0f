//! Builder for the hub runtime.
//!
//! Collaborators not supplied explicitly fall back to their in-memory
//! implementations; the in-memory repository is seeded from
//! `AppConfig::seed_nodes`.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{lifecycle::HubRuntime, HubComponents};
use crate::{
    config::AppConfig,
    distributor::Distributor,
    enforcer::{CapabilityRegistry, Enforcer, EnforcerDeps},
    fetch::{Fetcher, HttpFetcher},
    index::QualifiedNodeIndex,
    metrics::MetricsCollector,
    repository::{MemoryRepository, NodeRepository},
    router::Router,
    settlement::{MemorySettlement, SettlementClient},
    store::{BackingStore, MemoryStore},
};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_epoch_listener: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_epoch_listener: false, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`HubRuntime`].
#[derive(Default)]
pub struct HubRuntimeBuilder {
    config: Option<AppConfig>,
    options: RuntimeOptions,
    metrics: Option<Arc<MetricsCollector>>,
    store: Option<Arc<dyn BackingStore>>,
    repository: Option<Arc<dyn NodeRepository>>,
    settlement: Option<Arc<dyn SettlementClient>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl HubRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `metrics`, e.g. one with the Prometheus recorder installed.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the seeded in-memory repository; `seed_nodes` is then ignored.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn NodeRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn with_settlement(mut self, settlement: Arc<dyn SettlementClient>) -> Self {
        self.settlement = Some(settlement);
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Runs epoch maintenance whenever a new epoch is announced on the store.
    #[must_use]
    pub fn enable_epoch_listener(mut self) -> Self {
        self.options.enable_epoch_listener = true;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime, initializing all components and starting background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if configuration is missing or invalid, or a
    /// component fails to initialize.
    pub async fn build(self) -> Result<HubRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            seed_nodes = config.seed_nodes.len(),
            epoch_listener_enabled = self.options.enable_epoch_listener,
            "Initializing hub runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let repository = match self.repository {
            Some(repository) => {
                if !config.seed_nodes.is_empty() {
                    warn!("seed_nodes ignored, repository supplied explicitly");
                }
                repository
            }
            None => Arc::new(MemoryRepository::with_nodes(config.seed_nodes.clone())),
        };
        let settlement = self.settlement.unwrap_or_else(|| Arc::new(MemorySettlement::new()));
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpFetcher::new(config.fetcher.clone())
                    .map_err(|e| RuntimeError::Initialization(format!("HTTP fetcher: {e}")))?,
            ),
        };
        debug!("Collaborators initialized");

        let index = Arc::new(
            QualifiedNodeIndex::load(
                &config.index,
                config.enforcer.demotion_threshold,
                Arc::clone(&store),
                Arc::clone(&metrics),
            )
            .await
            .map_err(|e| RuntimeError::Initialization(format!("Qualified index: {e}")))?,
        );
        debug!(
            full = index.pool(crate::types::NodeClass::Full).len().await,
            rss = index.pool(crate::types::NodeClass::Rss).len().await,
            "Qualified index loaded"
        );

        let capabilities = Arc::new(CapabilityRegistry::new());
        let router = Arc::new(Router::new(
            Arc::clone(&fetcher),
            config.router.clone(),
            Arc::clone(&metrics),
        ));
        let enforcer = Arc::new(
            Enforcer::new(
                config.enforcer.clone(),
                config.scoring.clone(),
                EnforcerDeps {
                    index: Arc::clone(&index),
                    repository: Arc::clone(&repository),
                    store: Arc::clone(&store),
                    settlement: Arc::clone(&settlement),
                    fetcher: Arc::clone(&fetcher),
                    capabilities: Arc::clone(&capabilities),
                    metrics: Arc::clone(&metrics),
                },
            )
            .map_err(|e| RuntimeError::Initialization(e.to_string()))?,
        );
        let distributor = Arc::new(Distributor::new(
            config.distributor.clone(),
            Arc::clone(&router),
            Arc::clone(&enforcer),
            Arc::clone(&index),
            Arc::clone(&repository),
        ));
        debug!("Router, enforcer and distributor initialized");

        let components = HubComponents {
            metrics,
            store,
            repository,
            settlement,
            fetcher,
            index,
            capabilities,
            router,
            enforcer,
            distributor,
        };
        let runtime = HubRuntime::new(
            components,
            shutdown_tx,
            config,
            self.options.enable_epoch_listener,
        );

        info!("Hub runtime initialization complete");
        Ok(runtime)
    }
}
