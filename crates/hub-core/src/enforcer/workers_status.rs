//! Payload of a node's `GET /workers_status` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Health of a single worker. Unknown states fail deserialization, which
/// counts as a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    #[serde(alias = "ready", alias = "READY")]
    Ready,
    #[serde(alias = "indexing", alias = "INDEXING")]
    Indexing,
    #[serde(alias = "unhealthy", alias = "UNHEALTHY")]
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDetail {
    pub network: String,
    pub worker: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: WorkerState,
}

impl WorkerDetail {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == WorkerState::Ready
    }
}

/// A worker tagged with the role it plays on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker<'a> {
    Decentralized(&'a WorkerDetail),
    Rss(&'a WorkerDetail),
    Federated(&'a WorkerDetail),
}

impl<'a> Worker<'a> {
    #[must_use]
    pub fn detail(&self) -> &'a WorkerDetail {
        match self {
            Self::Decentralized(detail) | Self::Rss(detail) | Self::Federated(detail) => detail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersStatus {
    #[serde(default)]
    pub decentralized: Vec<WorkerDetail>,
    #[serde(default)]
    pub rss: Option<WorkerDetail>,
    #[serde(default)]
    pub federated: Vec<WorkerDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersStatusResponse {
    pub data: WorkersStatus,
}

impl WorkersStatus {
    pub fn workers(&self) -> impl Iterator<Item = Worker<'_>> {
        self.decentralized
            .iter()
            .map(Worker::Decentralized)
            .chain(self.rss.iter().map(Worker::Rss))
            .chain(self.federated.iter().map(Worker::Federated))
    }

    #[must_use]
    pub fn any_indexing(&self) -> bool {
        self.workers().any(|w| w.detail().status == WorkerState::Indexing)
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.workers().filter(|w| w.detail().is_ready()).count()
    }

    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.workers().all(|w| w.detail().is_ready())
    }

    #[must_use]
    pub fn is_rss_node(&self) -> bool {
        self.rss.as_ref().is_some_and(WorkerDetail::is_ready)
    }

    /// Ready decentralized workers mapped to the networks they serve.
    #[must_use]
    pub fn ready_worker_networks(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for detail in self.decentralized.iter().filter(|d| d.is_ready()) {
            map.entry(detail.worker.clone()).or_default().insert(detail.network.clone());
        }
        map
    }

    /// Distinct networks served by ready decentralized workers.
    #[must_use]
    pub fn decentralized_network_count(&self) -> u32 {
        distinct_networks(&self.decentralized)
    }

    /// Distinct networks served by ready federated workers.
    #[must_use]
    pub fn federated_network_count(&self) -> u32 {
        distinct_networks(&self.federated)
    }

    /// Ready decentralized workers.
    #[must_use]
    pub fn indexer_count(&self) -> u32 {
        let ready = self.decentralized.iter().filter(|d| d.is_ready()).count();
        u32::try_from(ready).unwrap_or(u32::MAX)
    }
}

fn distinct_networks(details: &[WorkerDetail]) -> u32 {
    let networks: BTreeSet<&str> =
        details.iter().filter(|d| d.is_ready()).map(|d| d.network.as_str()).collect();
    u32::try_from(networks.len()).unwrap_or(u32::MAX)
}
