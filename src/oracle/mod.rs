//! Interop oracle - normalized view of foreign blocks and transactions
//!
//! Every block and transaction read through [`CachedOracle`] is written to
//! the [`OracleStore`], so a restarted bridge can replay what it has already
//! seen before following the chain tip again.

mod ethereum;
mod neo;

pub use ethereum::EthereumBlockSource;
pub use neo::NeoBlockSource;

use crate::error::{BridgeError, BridgeResult};
use crate::state::OracleStore;
use crate::types::{Hash, InteropBlock, InteropTransaction};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Last fully processed height
    async fn height(&self, platform: &str) -> BridgeResult<u64>;

    async fn set_height(&self, platform: &str, height: u64) -> BridgeResult<()>;

    /// Every block previously read for the platform, lowest height first
    async fn read_all_blocks(&self, platform: &str) -> BridgeResult<Vec<InteropBlock>>;

    async fn read_block(&self, platform: &str, height: u64) -> BridgeResult<InteropBlock>;

    /// Like `read_block` but always goes to the chain and refreshes the cache
    async fn reload_block(&self, platform: &str, height: u64) -> BridgeResult<InteropBlock>;

    async fn read_transaction(&self, platform: &str, hash: &Hash)
        -> BridgeResult<InteropTransaction>;
}

/// Raw chain access behind the oracle cache
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, height: u64) -> BridgeResult<InteropBlock>;

    async fn fetch_transaction(&self, hash: &Hash) -> BridgeResult<InteropTransaction>;
}

struct PlatformSource {
    source: Arc<dyn BlockSource>,
    start_height: u64,
}

pub struct CachedOracle {
    store: Arc<dyn OracleStore>,
    sources: HashMap<String, PlatformSource>,
}

impl CachedOracle {
    pub fn new(store: Arc<dyn OracleStore>) -> Self {
        Self {
            store,
            sources: HashMap::new(),
        }
    }

    /// Attach a platform. Before any cursor is saved its height is `start_height`.
    pub fn with_source(
        mut self,
        platform: impl Into<String>,
        source: Arc<dyn BlockSource>,
        start_height: u64,
    ) -> Self {
        self.sources.insert(
            platform.into(),
            PlatformSource {
                source,
                start_height,
            },
        );
        self
    }

    fn source(&self, platform: &str) -> BridgeResult<&PlatformSource> {
        self.sources
            .get(platform)
            .ok_or_else(|| BridgeError::UnknownPlatform(platform.to_string()))
    }

    async fn fetch_and_store(&self, platform: &str, height: u64) -> BridgeResult<InteropBlock> {
        let block = self.source(platform)?.source.fetch_block(height).await?;
        if block.platform != platform || block.height != height {
            return Err(BridgeError::Oracle {
                platform: platform.to_string(),
                message: format!(
                    "source returned {}@{} for height {}",
                    block.platform, block.height, height
                ),
            });
        }
        self.store.store_block(&block).await?;
        debug!(
            "Cached {} block {} with {} transactions",
            platform,
            height,
            block.transactions.len()
        );
        Ok(block)
    }
}

#[async_trait]
impl Oracle for CachedOracle {
    async fn height(&self, platform: &str) -> BridgeResult<u64> {
        let start = self.source(platform)?.start_height;
        Ok(self.store.cursor(platform).await?.unwrap_or(start))
    }

    async fn set_height(&self, platform: &str, height: u64) -> BridgeResult<()> {
        self.store.save_cursor(platform, height).await
    }

    async fn read_all_blocks(&self, platform: &str) -> BridgeResult<Vec<InteropBlock>> {
        self.store.cached_blocks(platform).await
    }

    async fn read_block(&self, platform: &str, height: u64) -> BridgeResult<InteropBlock> {
        if let Some(block) = self.store.cached_block(platform, height).await? {
            return Ok(block);
        }
        self.fetch_and_store(platform, height).await
    }

    async fn reload_block(&self, platform: &str, height: u64) -> BridgeResult<InteropBlock> {
        self.fetch_and_store(platform, height).await
    }

    async fn read_transaction(
        &self,
        platform: &str,
        hash: &Hash,
    ) -> BridgeResult<InteropTransaction> {
        if let Some(tx) = self.store.cached_transaction(platform, hash).await? {
            return Ok(tx);
        }
        let tx = self.source(platform)?.source.fetch_transaction(hash).await?;
        self.store.store_transaction(&tx).await?;
        Ok(tx)
    }
}
