//! Shared fixtures for enforcer unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use super::{CapabilityRegistry, Enforcer, EnforcerConfig, EnforcerDeps, ScoringConfig};
use crate::{
    fetch::{FetchError, FetchRequest, Fetcher},
    index::{IndexConfig, QualifiedNodeIndex},
    metrics::MetricsCollector,
    repository::{
        MemoryRepository, NodeFilter, NodeRepository, Page, RepositoryError, StatFilter,
        WorkerFilter,
    },
    settlement::MemorySettlement,
    store::MemoryStore,
    types::{Address, Node, NodeInvalidResponse, NodeStatus, NodeWorker, Stat},
};

/// Answers by exact URL; unknown URLs fail with a transport error.
#[derive(Default)]
pub(crate) struct RouteFetcher {
    routes: Mutex<HashMap<String, Result<Bytes, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl RouteFetcher {
    pub(crate) fn respond(&self, url: &str, body: &str) {
        self.routes.lock().insert(url.to_string(), Ok(Bytes::from(body.to_string())));
    }

    pub(crate) fn fail(&self, url: &str, error: FetchError) {
        self.routes.lock().insert(url.to_string(), Err(error));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for RouteFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        self.calls.lock().push(request.url.clone());
        self.routes
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Transport("connection refused".into())))
    }
}

/// Yields to the scheduler before every call, the way a networked database
/// would, so concurrent callers really interleave.
pub(crate) struct YieldingRepository {
    inner: Arc<MemoryRepository>,
    fail_stat_writes: AtomicBool,
}

impl YieldingRepository {
    pub(crate) fn set_failing_stat_writes(&self, failing: bool) {
        self.fail_stat_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeRepository for YieldingRepository {
    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Page<Node>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.find_nodes(filter).await
    }

    async fn save_nodes(&self, nodes: &[Node]) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.save_nodes(nodes).await
    }

    async fn find_stats(&self, filter: &StatFilter) -> Result<Page<Stat>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.find_stats(filter).await
    }

    async fn save_stats(&self, stats: &[Stat]) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        if self.fail_stat_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("stat writes disabled".into()));
        }
        self.inner.save_stats(stats).await
    }

    async fn find_node_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<NodeWorker>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.find_node_workers(filter).await
    }

    async fn save_node_workers(&self, workers: &[NodeWorker]) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.save_node_workers(workers).await
    }

    async fn save_invalid_responses(
        &self,
        records: &[NodeInvalidResponse],
    ) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.save_invalid_responses(records).await
    }
}

pub(crate) struct Harness {
    pub enforcer: Arc<Enforcer>,
    pub repository: Arc<MemoryRepository>,
    /// The enforcer's view of `repository`.
    pub gateway: Arc<YieldingRepository>,
    pub store: Arc<MemoryStore>,
    pub settlement: Arc<MemorySettlement>,
    pub fetcher: Arc<RouteFetcher>,
    pub index: Arc<QualifiedNodeIndex>,
}

pub(crate) fn address(byte: u8) -> Address {
    Address::new([byte; 20])
}

pub(crate) fn endpoint(byte: u8) -> String {
    format!("http://node-{byte}.test")
}

pub(crate) fn node(byte: u8, status: NodeStatus) -> Node {
    Node {
        address: address(byte),
        endpoint: endpoint(byte),
        access_token: String::new(),
        version: "1.2.0".into(),
        status,
        staking: 0.0,
        is_public_good: false,
        tax_rate_basis_points: 0,
    }
}

pub(crate) async fn harness(nodes: Vec<Node>) -> Harness {
    harness_with(nodes, EnforcerConfig::default()).await
}

pub(crate) async fn harness_with(nodes: Vec<Node>, config: EnforcerConfig) -> Harness {
    let repository = Arc::new(MemoryRepository::with_nodes(nodes));
    let gateway = Arc::new(YieldingRepository {
        inner: Arc::clone(&repository),
        fail_stat_writes: AtomicBool::new(false),
    });
    let store = Arc::new(MemoryStore::new());
    let settlement = Arc::new(MemorySettlement::new());
    let fetcher = Arc::new(RouteFetcher::default());
    let metrics = Arc::new(MetricsCollector::new());
    let index = Arc::new(
        QualifiedNodeIndex::load(
            &IndexConfig::default(),
            config.demotion_threshold,
            store.clone(),
            Arc::clone(&metrics),
        )
        .await
        .unwrap(),
    );

    let enforcer = Enforcer::new(
        config,
        ScoringConfig::default(),
        EnforcerDeps {
            index: Arc::clone(&index),
            repository: gateway.clone(),
            store: store.clone(),
            settlement: settlement.clone(),
            fetcher: fetcher.clone(),
            capabilities: Arc::new(CapabilityRegistry::new()),
            metrics,
        },
    )
    .unwrap();

    Harness {
        enforcer: Arc::new(enforcer),
        repository,
        gateway,
        store,
        settlement,
        fetcher,
        index,
    }
}
