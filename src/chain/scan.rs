//! Oracle-driven block scanning shared by every foreign adapter

use crate::error::BridgeResult;
use crate::oracle::Oracle;
use crate::retry::RetryPolicy;
use crate::types::{InteropBlock, InteropTransaction, PendingSwap};

use futures::future::join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Blocks fetched in parallel per round
    pub batch_size: u64,
    /// Blocks kept between the scan target and the chain tip
    pub confirmations: u64,
    pub retry: RetryPolicy,
}

pub struct BlockScanner {
    platform: String,
    local_address: String,
    oracle: Arc<dyn Oracle>,
    settings: ScanSettings,
    resync: Mutex<VecDeque<u64>>,
    bootstrapped: AtomicBool,
}

impl BlockScanner {
    pub fn new(
        platform: impl Into<String>,
        local_address: impl Into<String>,
        oracle: Arc<dyn Oracle>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            platform: platform.into(),
            local_address: local_address.into(),
            oracle,
            settings,
            resync: Mutex::new(VecDeque::new()),
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    pub async fn request_resync(&self, height: u64) {
        info!("Resync of {} block {} requested", self.platform, height);
        self.resync.lock().await.push_back(height);
    }

    /// One scan round.
    ///
    /// The first round after start only replays the oracle cache. Later rounds
    /// drain queued resyncs, then walk batches from the cursor towards
    /// `chain_height() - confirmations`, saving the cursor after each batch.
    /// Transient failures end the round early with whatever was collected.
    pub async fn scan<F, Fut>(&self, chain_height: F) -> BridgeResult<Vec<PendingSwap>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BridgeResult<u64>>,
    {
        if !self.bootstrapped.load(Ordering::Acquire) {
            return Ok(self.bootstrap().await);
        }

        let retry = &self.settings.retry;
        let mut cursor = match retry
            .run("read cursor", || self.oracle.height(&self.platform))
            .await
        {
            Ok(height) => height,
            Err(e) => {
                warn!("{} scan skipped, cursor unavailable: {}", self.platform, e);
                return Ok(Vec::new());
            }
        };

        let mut swaps = self.drain_resyncs(cursor).await;

        let tip = match retry.run("read chain height", chain_height).await {
            Ok(height) => height,
            Err(e) => {
                warn!("{} chain height unavailable: {}", self.platform, e);
                return Ok(swaps);
            }
        };
        let target = tip.saturating_sub(self.settings.confirmations);

        while cursor < target {
            let from = cursor + 1;
            let to = target.min(cursor + self.settings.batch_size);

            let found = match self.scan_batch(from, to).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        "{} batch {}..={} failed, retrying next round: {}",
                        self.platform, from, to, e
                    );
                    break;
                }
            };

            if let Err(e) = retry
                .run("save cursor", || self.oracle.set_height(&self.platform, to))
                .await
            {
                warn!("{} cursor not saved at {}: {}", self.platform, to, e);
                break;
            }

            debug!(
                "{} scanned {}..={}, {} swaps",
                self.platform,
                from,
                to,
                found.len()
            );
            crate::metrics::record_cursor_height(&self.platform, to);
            swaps.extend(found);
            cursor = to;
        }

        Ok(swaps)
    }

    async fn bootstrap(&self) -> Vec<PendingSwap> {
        let blocks = match self
            .settings
            .retry
            .run("read cached blocks", || {
                self.oracle.read_all_blocks(&self.platform)
            })
            .await
        {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("{} bootstrap deferred: {}", self.platform, e);
                return Vec::new();
            }
        };

        let mut swaps = Vec::new();
        for block in &blocks {
            match self.swaps_in_block(block).await {
                Ok(found) => swaps.extend(found),
                Err(e) => {
                    warn!(
                        "{} bootstrap deferred at block {}: {}",
                        self.platform, block.height, e
                    );
                    return Vec::new();
                }
            }
        }

        self.bootstrapped.store(true, Ordering::Release);
        info!(
            "{} bootstrap replayed {} cached blocks, {} swaps",
            self.platform,
            blocks.len(),
            swaps.len()
        );
        swaps
    }

    async fn drain_resyncs(&self, cursor: u64) -> Vec<PendingSwap> {
        let requests: Vec<u64> = self.resync.lock().await.drain(..).collect();
        let mut swaps = Vec::new();

        for height in requests {
            if height > cursor {
                warn!(
                    "Rejected {} resync of block {} above cursor {}",
                    self.platform, height, cursor
                );
                continue;
            }
            let block = match self
                .settings
                .retry
                .run("reload block", || self.oracle.reload_block(&self.platform, height))
                .await
            {
                Ok(block) => block,
                Err(e) => {
                    warn!("{} resync of block {} failed: {}", self.platform, height, e);
                    continue;
                }
            };
            match self.swaps_in_block(&block).await {
                Ok(found) => swaps.extend(found),
                Err(e) => warn!("{} resync of block {} failed: {}", self.platform, height, e),
            }
        }

        swaps
    }

    async fn scan_batch(&self, from: u64, to: u64) -> BridgeResult<Vec<PendingSwap>> {
        let results = join_all((from..=to).map(|height| self.scan_block(height))).await;

        let mut swaps = Vec::new();
        for result in results {
            swaps.extend(result?);
        }
        Ok(swaps)
    }

    async fn scan_block(&self, height: u64) -> BridgeResult<Vec<PendingSwap>> {
        let block = self
            .settings
            .retry
            .run("read block", || self.oracle.read_block(&self.platform, height))
            .await?;
        self.swaps_in_block(&block).await
    }

    async fn swaps_in_block(&self, block: &InteropBlock) -> BridgeResult<Vec<PendingSwap>> {
        let mut swaps = Vec::new();
        for hash in &block.transactions {
            let tx = self
                .settings
                .retry
                .run("read transaction", || {
                    self.oracle.read_transaction(&self.platform, hash)
                })
                .await?;
            swaps.extend(self.deposits(&tx));
        }
        Ok(swaps)
    }

    fn deposits(&self, tx: &InteropTransaction) -> Vec<PendingSwap> {
        tx.transfers
            .iter()
            .filter(|t| t.destination_address == self.local_address)
            .filter(|t| {
                let self_send = t.source_address == t.destination_address;
                if self_send {
                    debug!("Ignoring {} self-send in {}", self.platform, tx.hash);
                }
                !self_send
            })
            .map(|t| PendingSwap {
                platform: self.platform.clone(),
                source_hash: tx.hash,
                source_address: t.source_address.clone(),
                destination_address: t.interop_address.clone(),
                amount: t.amount.clone(),
            })
            .collect()
    }
}
