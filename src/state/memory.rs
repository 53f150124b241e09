//! In-memory state store for tests and dry runs

use super::{OracleStore, SwapRepository};
use crate::error::BridgeResult;
use crate::types::{Hash, InteropBlock, InteropTransaction, PendingFee};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Regions {
    settled: HashMap<Hash, Hash>,
    pending: Vec<PendingFee>,
    in_progress: HashMap<Hash, Option<String>>,
    used_rpc: HashMap<Hash, String>,
}

#[derive(Default)]
struct OracleCache {
    cursors: HashMap<String, u64>,
    blocks: HashMap<String, BTreeMap<u64, InteropBlock>>,
    transactions: HashMap<(String, Hash), InteropTransaction>,
    /// Every cursor write, for tests asserting batch boundaries
    cursor_writes: Vec<(String, u64)>,
}

/// Non-persistent store implementing every state region
#[derive(Default)]
pub struct MemoryStore {
    regions: RwLock<Regions>,
    oracle: RwLock<OracleCache>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor values in the order they were saved
    pub async fn cursor_history(&self, platform: &str) -> Vec<u64> {
        self.oracle
            .read()
            .await
            .cursor_writes
            .iter()
            .filter(|(p, _)| p == platform)
            .map(|(_, h)| *h)
            .collect()
    }
}

#[async_trait]
impl SwapRepository for MemoryStore {
    async fn in_progress(&self, source: &Hash) -> BridgeResult<Option<Option<String>>> {
        Ok(self.regions.read().await.in_progress.get(source).cloned())
    }

    async fn claim(&self, source: &Hash) -> BridgeResult<bool> {
        let mut regions = self.regions.write().await;
        if regions.in_progress.contains_key(source) {
            return Ok(false);
        }
        regions.in_progress.insert(*source, None);
        Ok(true)
    }

    async fn set_in_progress(&self, source: &Hash, foreign_tx: &str) -> BridgeResult<()> {
        self.regions
            .write()
            .await
            .in_progress
            .insert(*source, Some(foreign_tx.to_string()));
        Ok(())
    }

    async fn clear_in_progress_if(&self, source: &Hash, expected: Option<&str>) -> BridgeResult<bool> {
        let mut regions = self.regions.write().await;
        match regions.in_progress.get(source) {
            Some(current) if current.as_deref() == expected => {
                regions.in_progress.remove(source);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settled(&self, source: &Hash) -> BridgeResult<Option<Hash>> {
        Ok(self.regions.read().await.settled.get(source).copied())
    }

    async fn pending_fees(&self) -> BridgeResult<Vec<PendingFee>> {
        Ok(self.regions.read().await.pending.clone())
    }

    async fn push_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()> {
        let mut regions = self.regions.write().await;
        if !regions.pending.iter().any(|p| p.source_hash == fee.source_hash) {
            regions.pending.push(fee.clone());
        }
        Ok(())
    }

    async fn update_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()> {
        let mut regions = self.regions.write().await;
        if let Some(entry) = regions
            .pending
            .iter_mut()
            .find(|p| p.source_hash == fee.source_hash)
        {
            *entry = fee.clone();
        }
        Ok(())
    }

    async fn finish_swap(&self, source: &Hash, destination: &Hash) -> BridgeResult<()> {
        let mut regions = self.regions.write().await;
        regions.settled.entry(*source).or_insert(*destination);
        regions.in_progress.remove(source);
        regions.used_rpc.remove(source);
        regions.pending.retain(|p| p.source_hash != *source);
        Ok(())
    }

    async fn used_endpoint(&self, source: &Hash) -> BridgeResult<Option<String>> {
        Ok(self.regions.read().await.used_rpc.get(source).cloned())
    }

    async fn set_used_endpoint(&self, source: &Hash, endpoint: &str) -> BridgeResult<()> {
        self.regions
            .write()
            .await
            .used_rpc
            .insert(*source, endpoint.to_string());
        Ok(())
    }
}

#[async_trait]
impl OracleStore for MemoryStore {
    async fn cursor(&self, platform: &str) -> BridgeResult<Option<u64>> {
        Ok(self.oracle.read().await.cursors.get(platform).copied())
    }

    async fn save_cursor(&self, platform: &str, height: u64) -> BridgeResult<()> {
        let mut oracle = self.oracle.write().await;
        let entry = oracle.cursors.entry(platform.to_string()).or_insert(height);
        if *entry < height {
            *entry = height;
        }
        oracle.cursor_writes.push((platform.to_string(), height));
        Ok(())
    }

    async fn cached_blocks(&self, platform: &str) -> BridgeResult<Vec<InteropBlock>> {
        Ok(self
            .oracle
            .read()
            .await
            .blocks
            .get(platform)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn cached_block(&self, platform: &str, height: u64) -> BridgeResult<Option<InteropBlock>> {
        Ok(self
            .oracle
            .read()
            .await
            .blocks
            .get(platform)
            .and_then(|b| b.get(&height).cloned()))
    }

    async fn store_block(&self, block: &InteropBlock) -> BridgeResult<()> {
        self.oracle
            .write()
            .await
            .blocks
            .entry(block.platform.clone())
            .or_default()
            .insert(block.height, block.clone());
        Ok(())
    }

    async fn cached_transaction(
        &self,
        platform: &str,
        hash: &Hash,
    ) -> BridgeResult<Option<InteropTransaction>> {
        Ok(self
            .oracle
            .read()
            .await
            .transactions
            .get(&(platform.to_string(), *hash))
            .cloned())
    }

    async fn store_transaction(&self, tx: &InteropTransaction) -> BridgeResult<()> {
        self.oracle
            .write()
            .await
            .transactions
            .insert((tx.platform.clone(), tx.hash), tx.clone());
        Ok(())
    }
}
