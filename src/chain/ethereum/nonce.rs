//! Nonce management for the operator wallet
//!
//! Handles:
//! - Local nonce tracking to avoid conflicts between concurrent deliveries
//! - Nonce gap detection and recovery

use super::ChainProvider;
use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, H256};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct NonceState {
    /// Next nonce to hand out
    current: u64,
    /// In-flight transactions: nonce -> tx hash
    pending: BTreeMap<u64, H256>,
    /// Last mined nonce
    confirmed: Option<u64>,
}

/// Hands out nonces for one wallet on one platform
pub struct NonceManager {
    platform: String,
    wallet_address: Address,
    state: Mutex<Option<NonceState>>,
}

impl NonceManager {
    /// Create a manager; the nonce is loaded by `init` or on first use
    pub fn new(platform: impl Into<String>, wallet_address: Address) -> Self {
        Self {
            platform: platform.into(),
            wallet_address,
            state: Mutex::new(None),
        }
    }

    fn not_initialized(&self) -> BridgeError {
        BridgeError::Nonce {
            platform: self.platform.clone(),
            message: "Nonce not initialized".to_string(),
        }
    }

    /// Load the on-chain nonce
    pub async fn init(&self, provider: &ChainProvider) -> BridgeResult<()> {
        let on_chain = self.fetch_nonce(provider).await?;
        *self.state.lock().await = Some(NonceState {
            current: on_chain,
            pending: BTreeMap::new(),
            confirmed: on_chain.checked_sub(1),
        });
        debug!("Initialized nonce for {}: {}", self.platform, on_chain);
        Ok(())
    }

    /// Allocate the next nonce, initializing lazily if startup could not reach the chain
    pub async fn next(&self, provider: &ChainProvider) -> BridgeResult<u64> {
        if self.state.lock().await.is_none() {
            self.init(provider).await?;
        }
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or_else(|| self.not_initialized())?;
        let nonce = state.current;
        state.current += 1;
        debug!("Allocated nonce {} for {}", nonce, self.platform);
        Ok(nonce)
    }

    /// Mark a nonce as pending with its transaction hash
    pub async fn mark_pending(&self, nonce: u64, tx_hash: H256) -> BridgeResult<()> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or_else(|| self.not_initialized())?;
        state.pending.insert(nonce, tx_hash);
        Ok(())
    }

    /// Confirm every nonce carried by a mined transaction
    pub async fn confirm(&self, tx_hash: H256) {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            return;
        };
        let mined: Vec<u64> = state
            .pending
            .iter()
            .filter(|(_, hash)| **hash == tx_hash)
            .map(|(nonce, _)| *nonce)
            .collect();
        for nonce in mined {
            state.pending.remove(&nonce);
            if state.confirmed.map_or(true, |c| nonce > c) {
                state.confirmed = Some(nonce);
            }
        }
    }

    /// Transaction never left the process; the nonce can be reused
    pub async fn release(&self, nonce: u64) {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            return;
        };
        state.pending.remove(&nonce);
        if nonce + 1 == state.current {
            state.current = nonce;
        }
    }

    /// Sync with on-chain state, dropping pending entries below the chain nonce
    pub async fn sync(&self, provider: &ChainProvider) -> BridgeResult<()> {
        let on_chain = self.fetch_nonce(provider).await?;
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or_else(|| self.not_initialized())?;

        let expected = state.confirmed.map_or(0, |c| c + 1);
        if on_chain > expected {
            warn!(
                "Nonce gap detected on {}: expected {}, got {}",
                self.platform, expected, on_chain
            );
        }

        state.pending.retain(|nonce, _| *nonce >= on_chain);
        state.confirmed = on_chain.checked_sub(1);
        if state.current < on_chain {
            state.current = on_chain;
        }
        Ok(())
    }

    /// Number of transactions awaiting confirmation
    pub async fn pending_count(&self) -> usize {
        self.state
            .lock()
            .await
            .as_ref()
            .map_or(0, |s| s.pending.len())
    }

    async fn fetch_nonce(&self, provider: &ChainProvider) -> BridgeResult<u64> {
        provider
            .get_transaction_count(self.wallet_address)
            .await
            .map_err(|e| BridgeError::Nonce {
                platform: self.platform.clone(),
                message: e.to_string(),
            })
    }
}
