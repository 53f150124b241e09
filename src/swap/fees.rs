//! Fee-settlement leg: `Settle -> Confirm -> Finished`, with `Confirm -> Settle`
//! when the native settlement never lands

use crate::clock::Clock;
use crate::error::BridgeResult;
use crate::metrics;
use crate::native::{NativeChain, NativeTxStatus};
use crate::state::SwapRepository;
use crate::types::{FeeStatus, PendingFee};

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FeeSettler {
    native: Arc<dyn NativeChain>,
    repository: Arc<dyn SwapRepository>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl FeeSettler {
    pub fn new(
        native: Arc<dyn NativeChain>,
        repository: Arc<dyn SwapRepository>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            native,
            repository,
            clock,
            cooldown,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Run one step for `fee`; returns the status it is left in.
    ///
    /// Native-chain failures leave the entry untouched for the next tick.
    /// Only repository failures are returned.
    pub async fn advance(&self, fee: &PendingFee) -> BridgeResult<FeeStatus> {
        match fee.status {
            FeeStatus::Settle => self.settle(fee).await,
            FeeStatus::Confirm => self.confirm(fee).await,
            FeeStatus::Finished => {
                self.finish(fee).await?;
                Ok(FeeStatus::Finished)
            }
        }
    }

    async fn settle(&self, fee: &PendingFee) -> BridgeResult<FeeStatus> {
        let elapsed = self.clock.now() - fee.time;
        if elapsed < self.cooldown {
            debug!(
                "Fee for {} cooling down ({}s of {}s)",
                fee.source_hash,
                elapsed.num_seconds(),
                self.cooldown.num_seconds()
            );
            return Ok(FeeStatus::Settle);
        }

        match self
            .native
            .settle_fee(&fee.source_hash, &fee.destination_hash)
            .await
        {
            Ok(settle_hash) => {
                info!("Fee for {} broadcast as {}", fee.source_hash, settle_hash);
                let next = PendingFee {
                    settle_hash: Some(settle_hash),
                    status: FeeStatus::Confirm,
                    ..fee.clone()
                };
                self.transition(fee, &next).await
            }
            Err(e) => {
                warn!("Fee settlement for {} failed: {}", fee.source_hash, e);
                Ok(FeeStatus::Settle)
            }
        }
    }

    async fn confirm(&self, fee: &PendingFee) -> BridgeResult<FeeStatus> {
        let Some(settle_hash) = fee.settle_hash else {
            warn!("Fee for {} awaiting confirmation without a hash", fee.source_hash);
            let next = PendingFee {
                status: FeeStatus::Settle,
                ..fee.clone()
            };
            return self.transition(fee, &next).await;
        };

        match self.native.transaction_status(&settle_hash).await {
            Ok(NativeTxStatus::Confirmed) => {
                self.finish(fee).await?;
                metrics::record_fee_transition(FeeStatus::Finished.as_str());
                info!("Swap {} fully settled", fee.source_hash);
                Ok(FeeStatus::Finished)
            }
            Ok(NativeTxStatus::Pending) => {
                warn!(
                    "Fee settlement {} for {} not found on chain, settling again",
                    settle_hash, fee.source_hash
                );
                let next = PendingFee {
                    settle_hash: None,
                    time: self.clock.now(),
                    status: FeeStatus::Settle,
                    ..fee.clone()
                };
                self.transition(fee, &next).await
            }
            Err(e) => {
                warn!("Status of fee settlement {} unavailable: {}", settle_hash, e);
                Ok(FeeStatus::Confirm)
            }
        }
    }

    async fn finish(&self, fee: &PendingFee) -> BridgeResult<()> {
        self.repository
            .finish_swap(&fee.source_hash, &fee.destination_hash)
            .await
    }

    async fn transition(&self, from: &PendingFee, to: &PendingFee) -> BridgeResult<FeeStatus> {
        debug_assert!(from.status.can_become(to.status));
        self.repository.update_pending_fee(to).await?;
        metrics::record_fee_transition(to.status.as_str());
        Ok(to.status)
    }
}
