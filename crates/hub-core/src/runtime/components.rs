//! Core component container for the hub runtime.

use std::sync::Arc;

use crate::{
    distributor::Distributor,
    enforcer::{CapabilityRegistry, Enforcer},
    fetch::Fetcher,
    index::QualifiedNodeIndex,
    metrics::MetricsCollector,
    repository::NodeRepository,
    router::Router,
    settlement::SettlementClient,
    store::BackingStore,
};

/// Every initialized component, shared behind `Arc`.
#[derive(Clone)]
pub struct HubComponents {
    pub(super) metrics: Arc<MetricsCollector>,
    pub(super) store: Arc<dyn BackingStore>,
    pub(super) repository: Arc<dyn NodeRepository>,
    pub(super) settlement: Arc<dyn SettlementClient>,
    pub(super) fetcher: Arc<dyn Fetcher>,
    pub(super) index: Arc<QualifiedNodeIndex>,
    pub(super) capabilities: Arc<CapabilityRegistry>,
    pub(super) router: Arc<Router>,
    pub(super) enforcer: Arc<Enforcer>,
    pub(super) distributor: Arc<Distributor>,
}

impl HubComponents {
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn NodeRepository> {
        &self.repository
    }

    #[must_use]
    pub fn settlement(&self) -> &Arc<dyn SettlementClient> {
        &self.settlement
    }

    #[must_use]
    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    #[must_use]
    pub fn index(&self) -> &Arc<QualifiedNodeIndex> {
        &self.index
    }

    /// Worker capability snapshot rebuilt at every epoch.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn enforcer(&self) -> &Arc<Enforcer> {
        &self.enforcer
    }

    #[must_use]
    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }
}
