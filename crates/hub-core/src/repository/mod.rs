//! Persistent node records: nodes, stats, worker history and invalid-response
//! audit rows.
//!
//! Multi-row writes are all-or-nothing. Listing is cursor-paged by address.

pub mod memory;

pub use memory::MemoryRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Address, Epoch, Node, NodeInvalidResponse, NodeStatus, NodeWorker, Stat};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("unknown node {0}")]
    UnknownNode(Address),
}

/// Default page size when a filter leaves `limit` at zero.
pub const DEFAULT_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub addresses: Option<Vec<Address>>,
    pub statuses: Option<Vec<NodeStatus>>,
    /// Exclusive lower bound on the address.
    pub cursor: Option<Address>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StatFilter {
    pub addresses: Option<Vec<Address>>,
    pub is_full_node: Option<bool>,
    pub is_rss_node: Option<bool>,
    pub cursor: Option<Address>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub epoch: Epoch,
    pub networks: Option<Vec<String>>,
    pub workers: Option<Vec<String>>,
    pub active_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Address to pass as the cursor of the next page.
    pub next_cursor: Option<Address>,
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Page<Node>, RepositoryError>;

    async fn save_nodes(&self, nodes: &[Node]) -> Result<(), RepositoryError>;

    async fn find_stats(&self, filter: &StatFilter) -> Result<Page<Stat>, RepositoryError>;

    async fn save_stats(&self, stats: &[Stat]) -> Result<(), RepositoryError>;

    async fn find_node_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<NodeWorker>, RepositoryError>;

    async fn save_node_workers(&self, workers: &[NodeWorker]) -> Result<(), RepositoryError>;

    async fn save_invalid_responses(
        &self,
        records: &[NodeInvalidResponse],
    ) -> Result<(), RepositoryError>;
}

/// Walks every page of nodes matching `addresses` and `statuses`; `None`
/// leaves that dimension unfiltered.
///
/// # Errors
///
/// Propagates the first repository failure.
pub async fn all_nodes(
    repository: &dyn NodeRepository,
    addresses: Option<Vec<Address>>,
    statuses: Option<Vec<NodeStatus>>,
) -> Result<Vec<Node>, RepositoryError> {
    let mut nodes = Vec::new();
    let mut filter =
        NodeFilter { addresses, statuses, limit: DEFAULT_PAGE_SIZE, ..NodeFilter::default() };
    loop {
        let page = repository.find_nodes(&filter).await?;
        nodes.extend(page.items);
        match page.next_cursor {
            Some(cursor) => filter.cursor = Some(cursor),
            None => return Ok(nodes),
        }
    }
}

/// Walks every page of stats for `addresses`.
///
/// # Errors
///
/// Propagates the first repository failure.
pub async fn stats_for(
    repository: &dyn NodeRepository,
    addresses: Vec<Address>,
) -> Result<Vec<Stat>, RepositoryError> {
    let mut stats = Vec::with_capacity(addresses.len());
    let mut filter = StatFilter {
        addresses: Some(addresses),
        limit: DEFAULT_PAGE_SIZE,
        ..StatFilter::default()
    };
    loop {
        let page = repository.find_stats(&filter).await?;
        stats.extend(page.items);
        match page.next_cursor {
            Some(cursor) => filter.cursor = Some(cursor),
            None => return Ok(stats),
        }
    }
}
