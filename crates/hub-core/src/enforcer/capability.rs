//! Network-wide worker capability maps.
//!
//! Rebuilt from the successful probes of each epoch pass and published as an
//! immutable, versioned snapshot. Readers load the current `Arc` and never
//! observe a partially rebuilt map.

use arc_swap::ArcSwap;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use super::workers_status::WorkersStatus;
use crate::types::Epoch;

type Index = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerCapabilities {
    pub version: u64,
    pub epoch: Epoch,
    worker_networks: Index,
    network_workers: Index,
    platform_workers: Index,
    tag_workers: Index,
}

impl WorkerCapabilities {
    /// Union of the ready decentralized workers reported by `probes`. A worker
    /// in any other state adds no requirement.
    #[must_use]
    pub fn from_probes<'a>(
        epoch: Epoch,
        version: u64,
        probes: impl IntoIterator<Item = &'a WorkersStatus>,
    ) -> Self {
        let mut capabilities = Self { version, epoch, ..Self::default() };
        for probe in probes {
            for detail in probe.decentralized.iter().filter(|d| d.is_ready()) {
                capabilities
                    .worker_networks
                    .entry(detail.worker.clone())
                    .or_default()
                    .insert(detail.network.clone());
                capabilities
                    .network_workers
                    .entry(detail.network.clone())
                    .or_default()
                    .insert(detail.worker.clone());
                if !detail.platform.is_empty() {
                    capabilities
                        .platform_workers
                        .entry(detail.platform.clone())
                        .or_default()
                        .insert(detail.worker.clone());
                }
                for tag in &detail.tags {
                    capabilities
                        .tag_workers
                        .entry(tag.clone())
                        .or_default()
                        .insert(detail.worker.clone());
                }
            }
        }
        capabilities
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.worker_networks.is_empty()
    }

    #[must_use]
    pub fn networks_for_worker(&self, worker: &str) -> Option<&BTreeSet<String>> {
        self.worker_networks.get(worker)
    }

    #[must_use]
    pub fn workers_for_network(&self, network: &str) -> Option<&BTreeSet<String>> {
        self.network_workers.get(network)
    }

    /// Platform lookup is case-insensitive.
    #[must_use]
    pub fn workers_for_platform(&self, platform: &str) -> Option<&BTreeSet<String>> {
        self.platform_workers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(platform))
            .map(|(_, workers)| workers)
    }

    #[must_use]
    pub fn workers_for_tag(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.tag_workers.get(tag)
    }

    /// A node is full when, for every known worker, its ready networks cover
    /// every network that worker is required on. An empty requirement set
    /// qualifies nobody.
    #[must_use]
    pub fn is_full_node(&self, ready: &BTreeMap<String, BTreeSet<String>>) -> bool {
        !self.worker_networks.is_empty()
            && self.worker_networks.iter().all(|(worker, required)| {
                ready.get(worker).is_some_and(|served| served.is_superset(required))
            })
    }
}

/// Holder of the current [`WorkerCapabilities`] snapshot.
#[derive(Default)]
pub struct CapabilityRegistry {
    current: ArcSwap<WorkerCapabilities>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn load(&self) -> Arc<WorkerCapabilities> {
        self.current.load_full()
    }

    pub fn replace(&self, capabilities: WorkerCapabilities) {
        self.current.store(Arc::new(capabilities));
    }

    /// Version the next snapshot should carry.
    #[must_use]
    pub fn next_version(&self) -> u64 {
        self.current.load().version + 1
    }
}
