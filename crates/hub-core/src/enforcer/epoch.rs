//! Epoch maintenance: probe every node, move it through its lifecycle, then
//! rebuild the capability snapshot and both qualified pools.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use semver::Version;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use super::{
    capability::WorkerCapabilities,
    config::parse_version,
    workers_status::{WorkersStatus, WorkersStatusResponse},
    Enforcer, EnforcerError,
};
use crate::{
    fetch::FetchRequest,
    repository::{all_nodes, stats_for},
    settlement::{ChainNodeInfo, StatusUpdate},
    store::{BackingStore, StoreError},
    types::{Address, Epoch, Node, NodeClass, NodeStatus, NodeWorker, Stat},
};

/// Summary of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: Epoch,
    /// `true` when the epoch had already been maintained and nothing ran.
    pub skipped: bool,
    pub probed: usize,
    pub probe_failures: usize,
    pub status_updates: usize,
    pub full_nodes: usize,
    pub rss_nodes: usize,
}

/// Next lifecycle status of a node and whether it qualifies as a full node.
///
/// `probe` is `None` when the worker-status probe failed.
#[must_use]
pub fn next_status(
    previous: NodeStatus,
    version_ok: bool,
    probe: Option<&WorkersStatus>,
    capabilities: &WorkerCapabilities,
) -> (NodeStatus, bool) {
    if previous.is_terminal() {
        return (previous, false);
    }
    if previous == NodeStatus::Exiting {
        return (NodeStatus::Exited, false);
    }
    if !version_ok {
        return (NodeStatus::Outdated, false);
    }
    let Some(probe) = probe else {
        let status = if previous == NodeStatus::Offline {
            NodeStatus::Offline
        } else {
            NodeStatus::Initializing
        };
        return (status, false);
    };
    if probe.any_indexing() {
        return (NodeStatus::Initializing, false);
    }
    if probe.ready_count() == 0 {
        return (NodeStatus::Registered, false);
    }

    let full = probe.all_ready() && capabilities.is_full_node(&probe.ready_worker_networks());
    (NodeStatus::Online, full)
}

/// Whether a node is probed at all this epoch. Outdated software is never
/// probed, so it cannot shape the capability maps either.
fn is_probed(node: &Node, min_version: &Version) -> bool {
    !node.status.is_terminal()
        && node.status != NodeStatus::Exiting
        && node_version_ok(node, min_version)
}

impl Enforcer {
    /// Runs the maintenance pass for `epoch`.
    ///
    /// Repeated or stale notifications for an already maintained epoch are a
    /// no-op. A failed pass is not recorded, so the next notification retries it.
    ///
    /// # Errors
    ///
    /// Returns the first repository, store, index or settlement failure. Probe
    /// failures never fail the pass.
    pub async fn maintain_epoch(&self, epoch: Epoch) -> Result<EpochReport, EnforcerError> {
        let mut maintained = self.maintained.lock().await;
        if maintained.is_some_and(|last| last >= epoch) {
            debug!(epoch, "epoch already maintained");
            return Ok(EpochReport { epoch, skipped: true, ..EpochReport::default() });
        }

        let started = Instant::now();
        let config = self.config();
        let min_version = config.min_version().map_err(EnforcerError::Config)?;
        info!(epoch, "epoch maintenance started");

        let mut nodes = all_nodes(self.repository.as_ref(), None, None).await?;
        let addresses: Vec<Address> = nodes.iter().map(|n| n.address).collect();
        let chain: HashMap<Address, ChainNodeInfo> = self
            .settlement
            .get_node_info(&addresses)
            .await?
            .into_iter()
            .map(|info| (info.address, info))
            .collect();
        for node in &mut nodes {
            if let Some(info) = chain.get(&node.address) {
                adopt_chain_info(node, info);
            }
        }

        let probe_futures: Vec<_> = nodes
            .iter()
            .filter(|n| is_probed(n, &min_version))
            .map(|node| async move { (node.address, self.probe(node).await) })
            .collect();
        let probes: HashMap<Address, Option<WorkersStatus>> =
            stream::iter(probe_futures)
                .buffer_unordered(config.probe_concurrency)
                .collect()
                .await;
        let probe_failures = probes.values().filter(|p| p.is_none()).count();

        self.capabilities.replace(WorkerCapabilities::from_probes(
            epoch,
            self.capabilities.next_version(),
            probes.values().flatten(),
        ));
        let capabilities = self.capabilities.load();

        let guard = self.stats_guard.lock().await;
        let now = Utc::now();
        let mut stats: HashMap<Address, Stat> = stats_for(self.repository.as_ref(), addresses)
            .await?
            .into_iter()
            .map(|stat| (stat.address, stat))
            .collect();
        let mut updates = Vec::new();
        let mut workers = Vec::new();

        for node in &mut nodes {
            let previous = node.status;
            let probe = probes.get(&node.address).and_then(Option::as_ref);
            let version_ok = node_version_ok(node, &min_version);
            let (status, is_full_node) = next_status(previous, version_ok, probe, &capabilities);

            let stat = stats.entry(node.address).or_insert_with(|| Stat::new(node, epoch, now));
            refresh_stat(stat, node, epoch, status, is_full_node, probe);
            if status == NodeStatus::Online && previous != NodeStatus::Online {
                stat.reset_at = now;
            }
            stat.score = self.scorer.score(stat, now);

            if let Some(probe) = probe {
                workers.extend(probe.decentralized.iter().map(|detail| NodeWorker {
                    epoch,
                    address: node.address,
                    network: detail.network.clone(),
                    worker: detail.worker.clone(),
                    is_active: detail.is_ready(),
                }));
            }

            // A terminal status that did not change this pass is already final on chain.
            let reported = chain.get(&node.address).map_or(previous, |info| info.status);
            let settled = status.is_terminal() && status == previous;
            if status != reported && !settled {
                updates.push(StatusUpdate { address: node.address, status });
            }
            if status != previous {
                info!(node = %node.address, from = %previous, to = %status, "node status changed");
                self.metrics.record_status_transition(previous, status);
                node.status = status;
            }
        }

        self.repository.save_nodes(&nodes).await?;
        let stats: Vec<Stat> = stats.into_values().collect();
        self.repository.save_stats(&stats).await?;
        self.set_current_epoch(epoch);
        if !workers.is_empty() {
            self.repository.save_node_workers(&workers).await?;
        }

        for class in NodeClass::ALL {
            let members: Vec<_> = stats
                .iter()
                .filter(|stat| stat.classes().contains(&class))
                .map(Stat::endpoint_cache)
                .collect();
            self.index.update_qualified_nodes_map(class, members).await?;
        }
        drop(guard);

        if !updates.is_empty() {
            match self.settlement.submit_status_updates(epoch, &updates).await {
                Ok(tx) => {
                    info!(epoch, count = updates.len(), tx = %tx, "status updates submitted");
                }
                Err(e) => {
                    error!(
                        epoch,
                        count = updates.len(),
                        error = %e,
                        "status update submission failed"
                    );
                    return Err(e.into());
                }
            }
        }

        *maintained = Some(epoch);
        self.metrics.record_epoch(epoch, started.elapsed());

        let report = EpochReport {
            epoch,
            skipped: false,
            probed: probes.len(),
            probe_failures,
            status_updates: updates.len(),
            full_nodes: self.index.pool(NodeClass::Full).len().await,
            rss_nodes: self.index.pool(NodeClass::Rss).len().await,
        };
        info!(
            epoch,
            probed = report.probed,
            probe_failures = report.probe_failures,
            status_updates = report.status_updates,
            full_nodes = report.full_nodes,
            rss_nodes = report.rss_nodes,
            elapsed_ms = started.elapsed().as_millis(),
            "epoch maintenance finished"
        );
        Ok(report)
    }

    /// `GET {endpoint}/workers_status`; `None` on any failure.
    async fn probe(&self, node: &Node) -> Option<WorkersStatus> {
        let url = format!("{}/workers_status", node.endpoint.trim_end_matches('/'));
        let request = FetchRequest::get(url).with_auth(&node.access_token);

        let result = match self.fetcher.fetch(&request).await {
            Ok(body) => serde_json::from_slice::<WorkersStatusResponse>(&body)
                .map(|response| response.data)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        self.metrics.record_probe(result.is_ok());

        match result {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(
                    node = %node.address,
                    endpoint = %node.endpoint,
                    error = %e,
                    "worker status probe failed"
                );
                None
            }
        }
    }
}

/// Chain data wins over local data. Exiting and terminal statuses are
/// decided on chain.
fn adopt_chain_info(node: &mut Node, info: &ChainNodeInfo) {
    node.staking = info.staking_pool;
    node.is_public_good = info.public_good;
    node.tax_rate_basis_points = info.tax_rate_basis_points;
    if info.status == NodeStatus::Exiting || info.status.is_terminal() {
        node.status = info.status;
    }
}

/// An unparsable version never satisfies the minimum.
fn node_version_ok(node: &Node, min_version: &Version) -> bool {
    parse_version(&node.version).is_some_and(|version| version >= *min_version)
}

fn refresh_stat(
    stat: &mut Stat,
    node: &Node,
    epoch: Epoch,
    status: NodeStatus,
    is_full_node: bool,
    probe: Option<&WorkersStatus>,
) {
    stat.reset_epoch(epoch);
    stat.endpoint.clone_from(&node.endpoint);
    stat.access_token.clone_from(&node.access_token);
    stat.staking = node.staking;
    stat.is_public_good = node.is_public_good;

    let online = status == NodeStatus::Online;
    stat.is_full_node = online && is_full_node;
    stat.is_rss_node = online && probe.is_some_and(WorkersStatus::is_rss_node);
    stat.decentralized_network = probe.map_or(0, WorkersStatus::decentralized_network_count);
    stat.federated_network = probe.map_or(0, WorkersStatus::federated_network_count);
    stat.indexer = probe.map_or(0, WorkersStatus::indexer_count);
}

/// Records `epoch` under `key` and notifies subscribers.
///
/// # Errors
///
/// Returns [`StoreError`] if either store call fails.
pub async fn announce_epoch(
    store: &dyn BackingStore,
    key: &str,
    epoch: Epoch,
) -> Result<(), StoreError> {
    store.set(key, epoch.to_string(), None).await?;
    store.publish(key, epoch.to_string()).await
}

/// Runs [`Enforcer::maintain_epoch`] for every epoch announced on the store.
pub struct EpochListener {
    enforcer: Arc<Enforcer>,
    store: Arc<dyn BackingStore>,
    key: String,
}

impl EpochListener {
    #[must_use]
    pub fn new(enforcer: Arc<Enforcer>, store: Arc<dyn BackingStore>) -> Self {
        let key = enforcer.config().epoch_key.clone();
        Self { enforcer, store, key }
    }

    /// Catches up on the epoch currently in the store, then follows
    /// announcements until shutdown.
    #[must_use]
    pub fn start_with_shutdown(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let mut updates = self.store.subscribe(&self.key);

        tokio::spawn(async move {
            self.catch_up().await;

            loop {
                tokio::select! {
                    message = updates.recv() => match message {
                        Ok(raw) => self.handle(&raw).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "epoch notifications lagged, re-reading current epoch");
                            self.catch_up().await;
                        }
                        Err(RecvError::Closed) => {
                            warn!(key = %self.key, "epoch channel closed");
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!("epoch listener shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn catch_up(&self) {
        match self.store.get(&self.key).await {
            Ok(Some(raw)) => self.handle(&raw).await,
            Ok(None) => debug!(key = %self.key, "no epoch recorded yet"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to read current epoch"),
        }
    }

    async fn handle(&self, raw: &str) {
        let Ok(epoch) = raw.trim().parse::<Epoch>() else {
            warn!(payload = %raw, "ignoring malformed epoch notification");
            return;
        };
        if let Err(e) = self.enforcer.maintain_epoch(epoch).await {
            error!(epoch, error = %e, "epoch maintenance failed");
        }
    }
}
