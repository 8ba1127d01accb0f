//! In-process [`NodeRepository`] used for development wiring and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use super::{
    NodeFilter, NodeRepository, Page, RepositoryError, StatFilter, WorkerFilter, DEFAULT_PAGE_SIZE,
};
use crate::types::{Address, Node, NodeInvalidResponse, NodeWorker, Stat};

#[derive(Default)]
struct Tables {
    nodes: BTreeMap<Address, Node>,
    stats: BTreeMap<Address, Stat>,
    workers: Vec<NodeWorker>,
    invalid_responses: Vec<NodeInvalidResponse>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

fn page<T: Clone>(
    rows: impl Iterator<Item = (Address, T)>,
    cursor: Option<Address>,
    limit: usize,
) -> Page<T> {
    let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
    let mut items: Vec<(Address, T)> =
        rows.filter(|(address, _)| cursor.is_none_or(|c| *address > c)).take(limit + 1).collect();
    let next_cursor = if items.len() > limit {
        items.truncate(limit);
        items.last().map(|(address, _)| *address)
    } else {
        None
    };
    Page { items: items.into_iter().map(|(_, row)| row).collect(), next_cursor }
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let repository = Self::default();
        {
            let mut tables = repository.tables.write();
            for node in nodes {
                tables.nodes.insert(node.address, node);
            }
        }
        repository
    }

    pub fn insert_node(&self, node: Node) {
        self.tables.write().nodes.insert(node.address, node);
    }

    pub fn insert_stat(&self, stat: Stat) {
        self.tables.write().stats.insert(stat.address, stat);
    }

    #[must_use]
    pub fn node(&self, address: &Address) -> Option<Node> {
        self.tables.read().nodes.get(address).cloned()
    }

    #[must_use]
    pub fn stat(&self, address: &Address) -> Option<Stat> {
        self.tables.read().stats.get(address).cloned()
    }

    #[must_use]
    pub fn workers(&self) -> Vec<NodeWorker> {
        self.tables.read().workers.clone()
    }

    #[must_use]
    pub fn invalid_responses(&self) -> Vec<NodeInvalidResponse> {
        self.tables.read().invalid_responses.clone()
    }

    /// Makes every subsequent operation fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("memory repository marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRepository for MemoryRepository {
    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Page<Node>, RepositoryError> {
        self.check()?;
        let tables = self.tables.read();
        let rows = tables
            .nodes
            .iter()
            .filter(|(address, _)| filter.addresses.as_ref().is_none_or(|a| a.contains(address)))
            .filter(|(_, node)| filter.statuses.as_ref().is_none_or(|s| s.contains(&node.status)))
            .map(|(address, node)| (*address, node.clone()));
        Ok(page(rows, filter.cursor, filter.limit))
    }

    async fn save_nodes(&self, nodes: &[Node]) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.write();
        for node in nodes {
            tables.nodes.insert(node.address, node.clone());
        }
        Ok(())
    }

    async fn find_stats(&self, filter: &StatFilter) -> Result<Page<Stat>, RepositoryError> {
        self.check()?;
        let tables = self.tables.read();
        let rows = tables
            .stats
            .iter()
            .filter(|(address, _)| filter.addresses.as_ref().is_none_or(|a| a.contains(address)))
            .filter(|(_, stat)| filter.is_full_node.is_none_or(|f| stat.is_full_node == f))
            .filter(|(_, stat)| filter.is_rss_node.is_none_or(|r| stat.is_rss_node == r))
            .map(|(address, stat)| (*address, stat.clone()));
        Ok(page(rows, filter.cursor, filter.limit))
    }

    async fn save_stats(&self, stats: &[Stat]) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.write();
        for stat in stats {
            tables.stats.insert(stat.address, stat.clone());
        }
        Ok(())
    }

    async fn find_node_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<NodeWorker>, RepositoryError> {
        self.check()?;
        let tables = self.tables.read();
        Ok(tables
            .workers
            .iter()
            .filter(|w| w.epoch == filter.epoch)
            .filter(|w| !filter.active_only || w.is_active)
            .filter(|w| filter.networks.as_ref().is_none_or(|n| n.contains(&w.network)))
            .filter(|w| filter.workers.as_ref().is_none_or(|n| n.contains(&w.worker)))
            .cloned()
            .collect())
    }

    async fn save_node_workers(&self, workers: &[NodeWorker]) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.write();
        for worker in workers {
            // (epoch, address, network, worker) is the natural key.
            tables.workers.retain(|w| {
                !(w.epoch == worker.epoch
                    && w.address == worker.address
                    && w.network == worker.network
                    && w.worker == worker.worker)
            });
            tables.workers.push(worker.clone());
        }
        Ok(())
    }

    async fn save_invalid_responses(
        &self,
        records: &[NodeInvalidResponse],
    ) -> Result<(), RepositoryError> {
        self.check()?;
        self.tables.write().invalid_responses.extend_from_slice(records);
        Ok(())
    }
}
