//! Qualified-node index.
//!
//! Each [`NodeClass`] has a sorted set in the backing store (member = node
//! address, score = reliability score) plus one endpoint projection per
//! member. [`ScoreMaintainer`] mirrors both in memory so selection does not
//! need a store round trip per node. The store is the source of truth: when
//! the two disagree the in-memory map is rebuilt from the store.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{
    metrics::MetricsCollector,
    store::{keys, BackingStore, StoreError},
    types::{Address, NodeClass, NodeEndpointCache},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode index entry for {address}: {reason}")]
    Encode { address: Address, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Prefix of every index key in the backing store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Expiry of endpoint projections; `None` keeps them until replaced.
    #[serde(default)]
    pub projection_ttl_seconds: Option<u64>,
}

fn default_key_prefix() -> String {
    "qualified_nodes".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { key_prefix: default_key_prefix(), projection_ttl_seconds: None }
    }
}

/// Score-ordered pool of qualified nodes for one class.
pub struct ScoreMaintainer {
    class: NodeClass,
    prefix: String,
    set_key: String,
    projection_ttl: Option<Duration>,
    demotion_threshold: u64,
    store: Arc<dyn BackingStore>,
    metrics: Arc<MetricsCollector>,
    nodes: Mutex<HashMap<Address, NodeEndpointCache>>,
}

impl ScoreMaintainer {
    /// Creates the maintainer and loads its map from the store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the initial load fails.
    pub async fn load(
        class: NodeClass,
        config: &IndexConfig,
        demotion_threshold: u64,
        store: Arc<dyn BackingStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, IndexError> {
        let maintainer = Self {
            class,
            prefix: config.key_prefix.clone(),
            set_key: keys::index_set(&config.key_prefix, class),
            projection_ttl: config.projection_ttl_seconds.map(Duration::from_secs),
            demotion_threshold,
            store,
            metrics,
            nodes: Mutex::new(HashMap::new()),
        };

        {
            let mut nodes = maintainer.nodes.lock().await;
            maintainer.rebuild(&mut nodes).await?;
            info!(class = %class, members = nodes.len(), "qualified-node index loaded");
        }
        Ok(maintainer)
    }

    #[must_use]
    pub fn class(&self) -> NodeClass {
        self.class
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    fn member_key(&self, address: &Address) -> String {
        keys::index_member(&self.prefix, self.class, address)
    }

    fn encode(node: &NodeEndpointCache) -> Result<String, IndexError> {
        serde_json::to_string(node)
            .map_err(|e| IndexError::Encode { address: node.address, reason: e.to_string() })
    }

    /// Inserts or rescores a node. A node at or over the demotion threshold is
    /// removed instead.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the store write fails; the in-memory map is
    /// only touched after the store accepted the change.
    pub async fn add_or_update_score(&self, node: NodeEndpointCache) -> Result<(), IndexError> {
        let mut nodes = self.nodes.lock().await;
        let member = node.address.to_string();

        if node.invalid_count >= self.demotion_threshold {
            self.store.zrem(&self.set_key, std::slice::from_ref(&member)).await?;
            self.store.delete(&[self.member_key(&node.address)]).await?;
            if nodes.remove(&node.address).is_some() {
                debug!(
                    class = %self.class,
                    node = %node.address,
                    invalid_count = node.invalid_count,
                    "node dropped from qualified index"
                );
            }
        } else {
            let projection = Self::encode(&node)?;
            self.store.set(&self.member_key(&node.address), projection, self.projection_ttl).await?;
            self.store.zadd(&self.set_key, &[(member, node.score)]).await?;
            nodes.insert(node.address, node);
        }

        self.metrics.record_index_size(self.class, nodes.len());
        Ok(())
    }

    /// Top `k` nodes by descending score.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn retrieve_qualified_nodes(
        &self,
        k: usize,
    ) -> Result<Vec<NodeEndpointCache>, IndexError> {
        let mut nodes = self.nodes.lock().await;
        let members = self.store.zrevrange(&self.set_key, Some(k)).await?;

        let unknown_member = members
            .iter()
            .any(|(member, _)| member.parse::<Address>().map_or(true, |a| !nodes.contains_key(&a)));
        let missing_member = members.len() < k.min(nodes.len());
        if unknown_member || missing_member {
            error!(
                class = %self.class,
                store_members = members.len(),
                local_members = nodes.len(),
                "qualified index diverged from store, rebuilding"
            );
            self.rebuild(&mut nodes).await?;
        }

        let mut selected = Vec::with_capacity(members.len());
        for (member, score) in members {
            let Ok(address) = member.parse::<Address>() else {
                continue;
            };
            if let Some(entry) = nodes.get(&address) {
                selected.push(NodeEndpointCache { score, ..entry.clone() });
            }
        }
        Ok(selected)
    }

    /// Replaces the whole class with `candidates`, dropping any at or over the
    /// demotion threshold.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on store failure. A partially applied store
    /// write leaves the map stale, which the next retrieval detects.
    pub async fn update_qualified_nodes_map(
        &self,
        candidates: Vec<NodeEndpointCache>,
    ) -> Result<(), IndexError> {
        let mut nodes = self.nodes.lock().await;

        let replacement: HashMap<Address, NodeEndpointCache> = candidates
            .into_iter()
            .filter(|node| node.invalid_count < self.demotion_threshold)
            .map(|node| (node.address, node))
            .collect();

        let existing = self.store.zrevrange(&self.set_key, None).await?;
        let stale: Vec<String> = existing
            .into_iter()
            .map(|(member, _)| member)
            .filter(|member| {
                member.parse::<Address>().map_or(true, |a| !replacement.contains_key(&a))
            })
            .collect();

        if !stale.is_empty() {
            self.store.zrem(&self.set_key, &stale).await?;
            let projections: Vec<String> = stale
                .iter()
                .filter_map(|member| member.parse::<Address>().ok())
                .map(|address| self.member_key(&address))
                .collect();
            self.store.delete(&projections).await?;
        }

        let mut scores = Vec::with_capacity(replacement.len());
        for node in replacement.values() {
            self.store
                .set(&self.member_key(&node.address), Self::encode(node)?, self.projection_ttl)
                .await?;
            scores.push((node.address.to_string(), node.score));
        }
        if !scores.is_empty() {
            self.store.zadd(&self.set_key, &scores).await?;
        }

        info!(
            class = %self.class,
            members = replacement.len(),
            removed = stale.len(),
            "qualified index replaced"
        );
        *nodes = replacement;
        self.metrics.record_index_size(self.class, nodes.len());
        Ok(())
    }

    async fn rebuild(
        &self,
        nodes: &mut HashMap<Address, NodeEndpointCache>,
    ) -> Result<(), IndexError> {
        let members = self.store.zrevrange(&self.set_key, None).await?;
        let mut rebuilt = HashMap::with_capacity(members.len());

        for (member, score) in members {
            let Ok(address) = member.parse::<Address>() else {
                error!(class = %self.class, member = %member, "unparsable index member");
                continue;
            };
            match self.store.get(&self.member_key(&address)).await? {
                Some(raw) => match serde_json::from_str::<NodeEndpointCache>(&raw) {
                    Ok(entry) => {
                        rebuilt.insert(address, NodeEndpointCache { score, ..entry });
                    }
                    Err(e) => {
                        error!(
                            class = %self.class,
                            node = %address,
                            error = %e,
                            "corrupt endpoint projection"
                        );
                    }
                },
                None => {
                    error!(
                        class = %self.class,
                        node = %address,
                        "index member has no endpoint projection"
                    );
                }
            }
        }

        *nodes = rebuilt;
        self.metrics.record_index_rebuild(self.class);
        self.metrics.record_index_size(self.class, nodes.len());
        Ok(())
    }
}

/// Both qualified pools behind one handle.
pub struct QualifiedNodeIndex {
    full: ScoreMaintainer,
    rss: ScoreMaintainer,
}

impl QualifiedNodeIndex {
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if either pool fails to load.
    pub async fn load(
        config: &IndexConfig,
        demotion_threshold: u64,
        store: Arc<dyn BackingStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, IndexError> {
        let full = ScoreMaintainer::load(
            NodeClass::Full,
            config,
            demotion_threshold,
            Arc::clone(&store),
            Arc::clone(&metrics),
        )
        .await?;
        let rss = ScoreMaintainer::load(NodeClass::Rss, config, demotion_threshold, store, metrics)
            .await?;
        Ok(Self { full, rss })
    }

    #[must_use]
    pub fn pool(&self, class: NodeClass) -> &ScoreMaintainer {
        match class {
            NodeClass::Full => &self.full,
            NodeClass::Rss => &self.rss,
        }
    }

    /// # Errors
    ///
    /// See [`ScoreMaintainer::add_or_update_score`].
    pub async fn add_or_update_score(
        &self,
        class: NodeClass,
        node: NodeEndpointCache,
    ) -> Result<(), IndexError> {
        self.pool(class).add_or_update_score(node).await
    }

    /// # Errors
    ///
    /// See [`ScoreMaintainer::retrieve_qualified_nodes`].
    pub async fn retrieve_qualified_nodes(
        &self,
        class: NodeClass,
        k: usize,
    ) -> Result<Vec<NodeEndpointCache>, IndexError> {
        self.pool(class).retrieve_qualified_nodes(k).await
    }

    /// # Errors
    ///
    /// See [`ScoreMaintainer::update_qualified_nodes_map`].
    pub async fn update_qualified_nodes_map(
        &self,
        class: NodeClass,
        nodes: Vec<NodeEndpointCache>,
    ) -> Result<(), IndexError> {
        self.pool(class).update_qualified_nodes_map(nodes).await
    }
}
