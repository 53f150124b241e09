//! Chain module - foreign platform adapters
//!
//! This module provides:
//! - The [`ChainAdapter`] contract every foreign chain implements
//! - A shared block scanner driving the oracle cursor
//! - Neo and Ethereum adapters
//! - The adapter registry used for swap routing

pub mod ethereum;
pub mod neo;
mod registry;
mod scan;

pub use registry::{AdapterRegistry, Route};
pub use scan::{BlockScanner, ScanSettings};

use crate::error::BridgeResult;
use crate::types::{DeliveryStatus, Hash, PendingSwap, TokenAmount};

use async_trait::async_trait;
use std::time::Duration;

/// Bounded polling used by `verify_delivery`
#[derive(Debug, Clone)]
pub struct VerifyPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn platform(&self) -> &str;

    /// Bridge-controlled deposit address on this chain
    fn local_address(&self) -> &str;

    async fn resolve_local_address(&self, key: &str) -> BridgeResult<String>;

    /// Incoming swaps found since the last call. Safe to call repeatedly.
    async fn scan(&self) -> BridgeResult<Vec<PendingSwap>>;

    /// Queue a historical block for a forced re-scan on the next `scan`
    async fn request_resync(&self, height: u64);

    /// Pay `amount` to `destination` for the swap identified by `source_hash`
    async fn deliver(
        &self,
        source_hash: &Hash,
        destination: &str,
        amount: &TokenAmount,
    ) -> BridgeResult<DeliveryStatus>;

    async fn verify_delivery(&self, source_hash: &Hash, foreign_tx: &str)
        -> BridgeResult<DeliveryStatus>;
}
