//! In-process [`SettlementClient`] that records every submission.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use super::{ChainNodeInfo, Demotion, SettlementClient, SettlementError, StatusUpdate, TxHash};
use crate::types::{Address, Epoch};

#[derive(Default)]
pub struct MemorySettlement {
    infos: Mutex<HashMap<Address, ChainNodeInfo>>,
    status_batches: Mutex<Vec<(Epoch, Vec<StatusUpdate>)>>,
    demotion_batches: Mutex<Vec<(Epoch, Vec<Demotion>)>>,
    failing: AtomicBool,
    nonce: AtomicU64,
}

impl MemorySettlement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node_info(&self, info: ChainNodeInfo) {
        self.infos.lock().insert(info.address, info);
    }

    /// Makes submissions fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn status_batches(&self) -> Vec<(Epoch, Vec<StatusUpdate>)> {
        self.status_batches.lock().clone()
    }

    #[must_use]
    pub fn demotion_batches(&self) -> Vec<(Epoch, Vec<Demotion>)> {
        self.demotion_batches.lock().clone()
    }

    fn next_tx(&self) -> Result<TxHash, SettlementError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SettlementError::Call("memory settlement marked failing".to_string()));
        }
        Ok(format!("0x{:064x}", self.nonce.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[async_trait]
impl SettlementClient for MemorySettlement {
    async fn get_node_info(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<ChainNodeInfo>, SettlementError> {
        let infos = self.infos.lock();
        Ok(addresses.iter().filter_map(|address| infos.get(address).cloned()).collect())
    }

    async fn submit_status_updates(
        &self,
        epoch: Epoch,
        updates: &[StatusUpdate],
    ) -> Result<TxHash, SettlementError> {
        let tx = self.next_tx()?;
        self.status_batches.lock().push((epoch, updates.to_vec()));
        Ok(tx)
    }

    async fn submit_demotions(
        &self,
        epoch: Epoch,
        demotions: &[Demotion],
    ) -> Result<TxHash, SettlementError> {
        let tx = self.next_tx()?;
        self.demotion_batches.lock().push((epoch, demotions.to_vec()));
        Ok(tx)
    }
}
