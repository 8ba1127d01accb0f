//! Shared key-value / sorted-set store.
//!
//! The store is the durable home of the qualified-node index and the per-epoch
//! request counters, and carries the epoch notification channel.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::{Address, Epoch, NodeClass};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Messages published on a store channel.
pub type Subscription = broadcast::Receiver<String>;

#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Adds members to a sorted set, overwriting existing scores.
    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<(), StoreError>;

    async fn zrem(&self, key: &str, members: &[String]) -> Result<(), StoreError>;

    /// Members by descending score, ties broken by member. `limit` of `None`
    /// returns the whole set.
    async fn zrevrange(
        &self,
        key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Increments integer counters in one round trip.
    async fn incr_batch(&self, increments: &[(String, i64)]) -> Result<(), StoreError>;

    async fn publish(&self, channel: &str, message: String) -> Result<(), StoreError>;

    fn subscribe(&self, channel: &str) -> Subscription;
}

/// Key layout shared by every store user.
pub mod keys {
    use super::{Address, Epoch, NodeClass};

    /// Sorted set of qualified nodes for a class.
    #[must_use]
    pub fn index_set(prefix: &str, class: NodeClass) -> String {
        format!("{prefix}:{class}")
    }

    /// Endpoint projection of one index member.
    #[must_use]
    pub fn index_member(prefix: &str, class: NodeClass, address: &Address) -> String {
        format!("{prefix}:{class}:{address}")
    }

    /// Per-epoch request counter of a node.
    #[must_use]
    pub fn epoch_requests(epoch: Epoch, address: &Address) -> String {
        format!("requests:{epoch}:{address}")
    }
}
