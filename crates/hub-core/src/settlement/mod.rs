//! Settlement layer client: the on-chain source of staking data and the sink
//! for status updates and demotions.

pub mod memory;

pub use memory::MemorySettlement;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Epoch, NodeStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettlementError {
    #[error("settlement call failed: {0}")]
    Call(String),

    #[error("settlement transaction rejected: {0}")]
    Rejected(String),
}

/// Node data as recorded by the settlement layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainNodeInfo {
    pub address: Address,
    pub status: NodeStatus,
    /// Staking pool size in whole tokens.
    pub staking_pool: f64,
    pub tax_rate_basis_points: u64,
    pub public_good: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub address: Address,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demotion {
    pub address: Address,
    pub reason: String,
}

/// Identifier of a submitted settlement transaction.
pub type TxHash = String;

#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Looks up chain-side node data; unknown addresses are omitted.
    async fn get_node_info(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<ChainNodeInfo>, SettlementError>;

    async fn submit_status_updates(
        &self,
        epoch: Epoch,
        updates: &[StatusUpdate],
    ) -> Result<TxHash, SettlementError>;

    async fn submit_demotions(
        &self,
        epoch: Epoch,
        demotions: &[Demotion],
    ) -> Result<TxHash, SettlementError>;
}
