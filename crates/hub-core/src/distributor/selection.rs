//! Capability-based node selection.
//!
//! A request names workers, networks or both. From the current capability
//! snapshot that becomes, per network, the exact set of workers a node must
//! run there. A node qualifies only if its active workers on every such
//! network equal that set.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    enforcer::WorkerCapabilities,
    types::{Address, NodeWorker},
};

/// Required workers per network.
pub type Requirements = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Workers(BTreeSet<String>),
    Networks(BTreeSet<String>),
    Both { workers: BTreeSet<String>, networks: BTreeSet<String> },
}

impl Selector {
    /// `None` when neither workers nor networks constrain the request.
    #[must_use]
    pub fn from_parts(workers: BTreeSet<String>, networks: BTreeSet<String>) -> Option<Self> {
        match (workers.is_empty(), networks.is_empty()) {
            (true, true) => None,
            (false, true) => Some(Self::Workers(workers)),
            (true, false) => Some(Self::Networks(networks)),
            (false, false) => Some(Self::Both { workers, networks }),
        }
    }
}

#[must_use]
pub fn required_sets(selector: &Selector, capabilities: &WorkerCapabilities) -> Requirements {
    let mut required = Requirements::new();
    match selector {
        Selector::Workers(workers) => {
            for worker in workers {
                for network in capabilities.networks_for_worker(worker).into_iter().flatten() {
                    required.entry(network.clone()).or_default().insert(worker.clone());
                }
            }
        }
        Selector::Networks(networks) => {
            for network in networks {
                if let Some(workers) = capabilities.workers_for_network(network) {
                    required.insert(network.clone(), workers.clone());
                }
            }
        }
        Selector::Both { workers, networks } => {
            for network in networks {
                let Some(served) = capabilities.workers_for_network(network) else {
                    continue;
                };
                let wanted: BTreeSet<String> = served.intersection(workers).cloned().collect();
                if !wanted.is_empty() {
                    required.insert(network.clone(), wanted);
                }
            }
        }
    }
    required
}

/// Nodes whose active workers equal `required` on every required network.
#[must_use]
pub fn matching_nodes(required: &Requirements, workers: &[NodeWorker]) -> Vec<Address> {
    if required.is_empty() {
        return Vec::new();
    }

    let mut active: BTreeMap<Address, Requirements> = BTreeMap::new();
    for row in workers.iter().filter(|w| w.is_active) {
        active
            .entry(row.address)
            .or_default()
            .entry(row.network.clone())
            .or_default()
            .insert(row.worker.clone());
    }

    active
        .into_iter()
        .filter(|(_, served)| {
            required.iter().all(|(network, wanted)| served.get(network) == Some(wanted))
        })
        .map(|(address, _)| address)
        .collect()
}
