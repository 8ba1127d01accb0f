//! Node selection and request dispatch.
//!
//! Each route picks its node set (capability match padded from the full
//! pool, the full pool alone, or the RSS pool), hands the fan-out to the
//! [`Router`] and schedules the enforcer's verification of the complete
//! response set.

mod errors;
pub mod query;
pub mod selection;

pub use errors::DistributorError;
pub use query::{
    AccountQuery, ActivityFilter, ActivityQuery, NetworkActivitiesQuery, PlatformActivitiesQuery,
};
pub use selection::{matching_nodes, required_sets, Requirements, Selector};

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, error};

use crate::{
    enforcer::{Enforcer, ResponseShape, WorkerCapabilities},
    index::QualifiedNodeIndex,
    payload::PayloadKind,
    repository::{all_nodes, stats_for, NodeRepository, WorkerFilter},
    router::{build_path, encode_query, encode_segment, node_requests, CollectedHandler, Router},
    types::{Address, NodeClass, NodeEndpointCache, NodeStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Nodes each request is fanned out to.
    #[serde(default = "default_node_count")]
    pub node_count: usize,
}

fn default_node_count() -> usize {
    3
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self { node_count: default_node_count() }
    }
}

impl DistributorConfig {
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_count == 0 {
            return Err("distributor.node_count must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Which enforcer entry point verifies a route's responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Single,
    Multi,
    /// Multi-result vote followed by the secondary-node cross-check.
    Partial,
}

pub struct Distributor {
    config: ArcSwap<DistributorConfig>,
    router: Arc<Router>,
    enforcer: Arc<Enforcer>,
    index: Arc<QualifiedNodeIndex>,
    repository: Arc<dyn NodeRepository>,
}

impl Distributor {
    #[must_use]
    pub fn new(
        config: DistributorConfig,
        router: Arc<Router>,
        enforcer: Arc<Enforcer>,
        index: Arc<QualifiedNodeIndex>,
        repository: Arc<dyn NodeRepository>,
    ) -> Self {
        Self { config: ArcSwap::from_pointee(config), router, enforcer, index, repository }
    }

    pub fn update_config(&self, config: DistributorConfig) {
        self.config.store(Arc::new(config));
    }

    /// `GET /decentralized/tx/{id}` on the top full nodes.
    ///
    /// # Errors
    ///
    /// See [`DistributorError`].
    pub async fn route_by_id(&self, query: &ActivityQuery) -> Result<Bytes, DistributorError> {
        let nodes = self.pad(Vec::new()).await?;
        let path = format!("/decentralized/tx/{}", encode_segment(&query.id));
        self.route(nodes, &path, &query.query_params(), PayloadKind::Activity, Verification::Single)
            .await
    }

    /// `GET /decentralized/{account}`; responses get the partial cross-check.
    ///
    /// # Errors
    ///
    /// See [`DistributorError`].
    pub async fn route_by_account(&self, query: &AccountQuery) -> Result<Bytes, DistributorError> {
        let capabilities = self.enforcer.capabilities().load();
        let selector =
            filter_selector(&query.filter, &capabilities, BTreeSet::new(), BTreeSet::new());
        let nodes = self.select(selector, &capabilities).await?;
        let path = format!("/decentralized/{}", encode_segment(&query.account));
        let params = query.query_params();
        self.route(nodes, &path, &params, PayloadKind::Activity, Verification::Partial).await
    }

    /// `GET /decentralized/network/{network}`.
    ///
    /// # Errors
    ///
    /// See [`DistributorError`].
    pub async fn route_by_network(
        &self,
        query: &NetworkActivitiesQuery,
    ) -> Result<Bytes, DistributorError> {
        let capabilities = self.enforcer.capabilities().load();
        let networks = BTreeSet::from([query.network.clone()]);
        let selector = filter_selector(&query.filter, &capabilities, BTreeSet::new(), networks);
        let nodes = self.select(selector, &capabilities).await?;
        let path = format!("/decentralized/network/{}", encode_segment(&query.network));
        self.route(nodes, &path, &query.query_params(), PayloadKind::Activity, Verification::Multi)
            .await
    }

    /// `GET /decentralized/platform/{platform}`.
    ///
    /// # Errors
    ///
    /// See [`DistributorError`].
    pub async fn route_by_platform(
        &self,
        query: &PlatformActivitiesQuery,
    ) -> Result<Bytes, DistributorError> {
        let capabilities = self.enforcer.capabilities().load();
        let workers =
            capabilities.workers_for_platform(&query.platform).cloned().unwrap_or_default();
        let selector = filter_selector(&query.filter, &capabilities, workers, BTreeSet::new());
        let nodes = self.select(selector, &capabilities).await?;
        let path = format!("/decentralized/platform/{}", encode_segment(&query.platform));
        self.route(nodes, &path, &query.query_params(), PayloadKind::Activity, Verification::Multi)
            .await
    }

    /// `GET /rss/{path}` on the top RSS nodes. The body is passed through
    /// unparsed.
    ///
    /// # Errors
    ///
    /// See [`DistributorError`].
    pub async fn route_rss(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Bytes, DistributorError> {
        let segments: Vec<String> =
            path.split('/').filter(|s| !s.is_empty()).map(encode_segment).collect();
        if segments.is_empty() {
            return Err(DistributorError::InvalidQuery("rss path must not be empty".to_string()));
        }

        let node_count = self.config.load().node_count;
        let nodes = self.index.retrieve_qualified_nodes(NodeClass::Rss, node_count).await?;
        let path = format!("/rss/{}", segments.join("/"));
        self.route(nodes, &path, query, PayloadKind::Raw, Verification::Multi).await
    }

    /// Capability match when the request is constrained, then padded from the
    /// full pool.
    async fn select(
        &self,
        selector: Option<Selector>,
        capabilities: &WorkerCapabilities,
    ) -> Result<Vec<NodeEndpointCache>, DistributorError> {
        let Some(selector) = selector else {
            return self.pad(Vec::new()).await;
        };
        let required = required_sets(&selector, capabilities);
        if required.is_empty() {
            debug!(selector = ?selector, "no capability requirements known, using full pool");
            return self.pad(Vec::new()).await;
        }

        let workers = self
            .repository
            .find_node_workers(&WorkerFilter {
                epoch: capabilities.epoch,
                networks: Some(required.keys().cloned().collect()),
                workers: None,
                active_only: true,
            })
            .await?;
        let matched = matching_nodes(&required, &workers);
        debug!(required = ?required, matched = matched.len(), "capability selection");

        let selected = self.qualified(matched).await?;
        self.pad(selected).await
    }

    /// Online, non-demoted nodes among `addresses`, best score first.
    async fn qualified(
        &self,
        addresses: Vec<Address>,
    ) -> Result<Vec<NodeEndpointCache>, DistributorError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let online: Vec<Address> =
            all_nodes(self.repository.as_ref(), Some(addresses), Some(vec![NodeStatus::Online]))
                .await?
                .into_iter()
                .map(|node| node.address)
                .collect();
        if online.is_empty() {
            return Ok(Vec::new());
        }

        let threshold = self.enforcer.scorer().demotion_threshold();
        let mut nodes: Vec<NodeEndpointCache> = stats_for(self.repository.as_ref(), online)
            .await?
            .iter()
            .filter(|stat| stat.epoch_invalid_request < threshold)
            .map(|stat| stat.endpoint_cache())
            .collect();
        nodes.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.address.cmp(&b.address)));
        nodes.truncate(self.config.load().node_count);
        Ok(nodes)
    }

    /// Tops `selected` up from the full pool, best score first, skipping
    /// nodes already chosen.
    async fn pad(
        &self,
        mut selected: Vec<NodeEndpointCache>,
    ) -> Result<Vec<NodeEndpointCache>, DistributorError> {
        let wanted = self.config.load().node_count;
        if selected.len() < wanted {
            let pool = self
                .index
                .retrieve_qualified_nodes(NodeClass::Full, wanted + selected.len())
                .await?;
            for node in pool {
                if selected.len() >= wanted {
                    break;
                }
                if selected.iter().all(|s| s.address != node.address) {
                    selected.push(node);
                }
            }
        }
        Ok(selected)
    }

    async fn route(
        &self,
        nodes: Vec<NodeEndpointCache>,
        path: &str,
        query: &[(String, String)],
        kind: PayloadKind,
        verification: Verification,
    ) -> Result<Bytes, DistributorError> {
        if nodes.is_empty() {
            return Err(DistributorError::NoQualifiedNodes);
        }

        let requests = node_requests(build_path(path, query, &nodes)?, &nodes);
        let encoded = encode_query(query);
        let request =
            if encoded.is_empty() { path.to_string() } else { format!("{path}?{encoded}") };
        debug!(request = %request, nodes = nodes.len(), ?verification, "routing request");

        let handler = verification_handler(Arc::clone(&self.enforcer), request, verification);
        let winner = self.router.distribute_as(requests, kind, handler).await?;
        Ok(winner.data.unwrap_or_default())
    }
}

fn verification_handler(
    enforcer: Arc<Enforcer>,
    request: String,
    verification: Verification,
) -> CollectedHandler {
    Box::new(move |responses| {
        async move {
            let result = match verification {
                Verification::Single => {
                    enforcer.verify_responses(&request, ResponseShape::Single, responses).await
                }
                Verification::Multi => {
                    enforcer.verify_responses(&request, ResponseShape::Multi, responses).await
                }
                Verification::Partial => {
                    enforcer.verify_partial_responses(&request, responses).await
                }
            };
            if let Err(e) = result {
                error!(request = %request, error = %e, "response verification failed");
            }
        }
        .boxed()
    })
}

/// Selector for an activity-list route: explicit `workers`/`networks` plus
/// whatever the filter's platforms, tags and networks resolve to.
fn filter_selector(
    filter: &ActivityFilter,
    capabilities: &WorkerCapabilities,
    mut workers: BTreeSet<String>,
    mut networks: BTreeSet<String>,
) -> Option<Selector> {
    networks.extend(filter.networks.iter().cloned());
    for platform in &filter.platforms {
        workers.extend(capabilities.workers_for_platform(platform).into_iter().flatten().cloned());
    }
    if workers.is_empty() {
        for tag in &filter.tags {
            workers.extend(capabilities.workers_for_tag(tag).into_iter().flatten().cloned());
        }
    }
    Selector::from_parts(workers, networks)
}
