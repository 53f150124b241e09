//! Persistent bridge state
//!
//! Four logical regions back the settlement protocol:
//! - `settled`: source hash -> destination hash, written once
//! - `pending`: ordered fee-settlement queue
//! - `inprogress`: source hash -> optional foreign transaction id
//! - `usedrpc`: source hash -> RPC endpoint that accepted the broadcast
//!
//! The oracle cursor and block cache live beside them in [`OracleStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::BridgeResult;
use crate::types::{Hash, InteropBlock, InteropTransaction, PendingFee};

use async_trait::async_trait;

/// Typed access to the swap settlement regions
#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// `None` if no record, `Some(None)` if claimed without a transaction yet
    async fn in_progress(&self, source: &Hash) -> BridgeResult<Option<Option<String>>>;

    /// Record a claim with no transaction. Returns false if a record already exists.
    async fn claim(&self, source: &Hash) -> BridgeResult<bool>;

    /// Attach the broadcast foreign transaction id to a claim
    async fn set_in_progress(&self, source: &Hash, foreign_tx: &str) -> BridgeResult<()>;

    /// Drop the record only while it still holds `expected` (`None` for a bare claim).
    /// Returns whether a record was removed.
    async fn clear_in_progress_if(&self, source: &Hash, expected: Option<&str>) -> BridgeResult<bool>;

    async fn settled(&self, source: &Hash) -> BridgeResult<Option<Hash>>;

    /// Fee queue in insertion order
    async fn pending_fees(&self) -> BridgeResult<Vec<PendingFee>>;

    async fn push_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()>;

    /// Replace the queued entry with the same source hash
    async fn update_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()>;

    /// Atomically write `settled`, drop the `inprogress` and `usedrpc` records and any queued fee
    async fn finish_swap(&self, source: &Hash, destination: &Hash) -> BridgeResult<()>;

    async fn used_endpoint(&self, source: &Hash) -> BridgeResult<Option<String>>;

    async fn set_used_endpoint(&self, source: &Hash, endpoint: &str) -> BridgeResult<()>;

    async fn health_check(&self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Oracle cursor and block cache
#[async_trait]
pub trait OracleStore: Send + Sync {
    async fn cursor(&self, platform: &str) -> BridgeResult<Option<u64>>;

    /// Persist the cursor; never moves it backwards
    async fn save_cursor(&self, platform: &str, height: u64) -> BridgeResult<()>;

    /// Every cached block for the platform in increasing height order
    async fn cached_blocks(&self, platform: &str) -> BridgeResult<Vec<InteropBlock>>;

    async fn cached_block(&self, platform: &str, height: u64) -> BridgeResult<Option<InteropBlock>>;

    async fn store_block(&self, block: &InteropBlock) -> BridgeResult<()>;

    async fn cached_transaction(
        &self,
        platform: &str,
        hash: &Hash,
    ) -> BridgeResult<Option<InteropTransaction>>;

    async fn store_transaction(&self, tx: &InteropTransaction) -> BridgeResult<()>;
}
