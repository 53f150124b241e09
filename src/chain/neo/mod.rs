//! Neo adapter - NEP-5 deposits in, NEP-5 transfers out

pub mod address;
pub mod rpc;

pub use rpc::NeoRpcClient;

use super::{BlockScanner, ChainAdapter, VerifyPolicy};
use crate::config::PlatformConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::signer::{SignRequest, TransactionSigner};
use crate::state::SwapRepository;
use crate::types::{DeliveryStatus, Hash, PendingSwap, TokenAmount};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// The subset of the Neo RPC surface the adapter drives
#[async_trait]
pub trait NeoNode: Send + Sync {
    /// Number of blocks; the tip height is one less
    async fn block_count(&self) -> BridgeResult<u64>;

    /// Height of the block including `hash`, `None` if not on chain
    async fn transaction_height(&self, hash: &Hash) -> BridgeResult<Option<u64>>;

    async fn mempool(&self, endpoint: &str) -> BridgeResult<Vec<Hash>>;

    /// Hand the transaction to the seed endpoints in order until one accepts
    async fn broadcast(&self, raw: &str) -> Broadcast;
}

/// What the seed endpoints said about a signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    /// Taken into the mempool of this endpoint
    Accepted(String),
    /// Every endpoint answered and none took it
    Refused,
    /// No acceptance seen, but this endpoint may have received it before the reply was lost
    Unconfirmed(String),
}

pub struct NeoAdapter {
    config: PlatformConfig,
    node: Arc<dyn NeoNode>,
    signer: Arc<dyn TransactionSigner>,
    repository: Arc<dyn SwapRepository>,
    scanner: BlockScanner,
    verify: VerifyPolicy,
}

impl NeoAdapter {
    /// Fails if the operator key does not control the configured address
    pub async fn new(
        config: PlatformConfig,
        node: Arc<dyn NeoNode>,
        signer: Arc<dyn TransactionSigner>,
        repository: Arc<dyn SwapRepository>,
        scanner: BlockScanner,
        verify: VerifyPolicy,
    ) -> BridgeResult<Self> {
        address::address_to_script_hash(&config.address)?;
        let adapter = Self {
            config,
            node,
            signer,
            repository,
            scanner,
            verify,
        };

        let resolved = adapter.resolve_local_address(&adapter.config.key).await?;
        if resolved != adapter.config.address {
            return Err(BridgeError::Config(format!(
                "{} key resolves to {} but {} is configured",
                adapter.config.name, resolved, adapter.config.address
            )));
        }
        Ok(adapter)
    }

    fn transfer_request(&self, destination: &str, amount: &TokenAmount) -> BridgeResult<SignRequest> {
        let token = self.config.token(&amount.symbol)?;
        let contract = token.contract.clone().ok_or_else(|| BridgeError::UnknownToken {
            platform: self.config.name.clone(),
            symbol: amount.symbol.clone(),
        })?;
        address::address_to_script_hash(destination)?;

        Ok(SignRequest::TokenTransfer {
            contract,
            from: self.config.address.clone(),
            to: destination.to_string(),
            amount: amount.to_precision(token.decimals)?,
        })
    }
}

#[async_trait]
impl ChainAdapter for NeoAdapter {
    fn platform(&self) -> &str {
        &self.config.name
    }

    fn local_address(&self) -> &str {
        &self.config.address
    }

    async fn resolve_local_address(&self, key: &str) -> BridgeResult<String> {
        self.signer.address(&self.config.name, key).await
    }

    async fn scan(&self) -> BridgeResult<Vec<PendingSwap>> {
        self.scanner
            .scan(move || async move {
                self.node
                    .block_count()
                    .await
                    .map(|count| count.saturating_sub(1))
            })
            .await
    }

    async fn request_resync(&self, height: u64) {
        self.scanner.request_resync(height).await;
    }

    async fn deliver(
        &self,
        source_hash: &Hash,
        destination: &str,
        amount: &TokenAmount,
    ) -> BridgeResult<DeliveryStatus> {
        if let Some(Some(tx)) = self.repository.in_progress(source_hash).await? {
            return self.verify_delivery(source_hash, &tx).await;
        }

        let request = match self.transfer_request(destination, amount) {
            Ok(request) => request,
            Err(e) => {
                warn!("Cannot pay {} on {}: {}", source_hash, self.config.name, e);
                return Ok(DeliveryStatus::NotBroadcast);
            }
        };

        let signed = match self
            .signer
            .sign(&self.config.name, &self.config.key, &request)
            .await
        {
            Ok(signed) => signed,
            Err(e) => {
                warn!("Signing payment for {} failed: {}", source_hash, e);
                return Ok(DeliveryStatus::NotBroadcast);
            }
        };

        let (endpoint, acknowledged) = match self.node.broadcast(&signed.raw).await {
            Broadcast::Accepted(endpoint) => (endpoint, true),
            Broadcast::Unconfirmed(endpoint) => (endpoint, false),
            Broadcast::Refused => {
                warn!("Every {} endpoint refused the payment for {}", self.config.name, source_hash);
                return Ok(DeliveryStatus::NotBroadcast);
            }
        };

        let tx = signed.hash.to_string();
        self.repository.set_in_progress(source_hash, &tx).await?;
        self.repository
            .set_used_endpoint(source_hash, &endpoint)
            .await?;
        if !acknowledged {
            warn!(
                "Payment {} for {} may have reached {}, leaving it to verification",
                tx, source_hash, endpoint
            );
            return Ok(DeliveryStatus::Pending);
        }
        info!(
            "Sent {} {} to {} on {} for {} via {}",
            amount.value, amount.symbol, destination, self.config.name, source_hash, endpoint
        );

        self.verify_delivery(source_hash, &tx).await
    }

    async fn verify_delivery(
        &self,
        source_hash: &Hash,
        foreign_tx: &str,
    ) -> BridgeResult<DeliveryStatus> {
        let tx: Hash = foreign_tx.parse()?;

        for attempt in 0..self.verify.attempts {
            match self.node.transaction_height(&tx).await {
                Ok(Some(height)) => {
                    info!("{} payment {} included at {}", self.config.name, tx, height);
                    return Ok(DeliveryStatus::Confirmed(tx));
                }
                Ok(None) => {}
                Err(e) => warn!("Checking {} failed: {}", tx, e),
            }
            if attempt + 1 < self.verify.attempts {
                tokio::time::sleep(self.verify.delay).await;
            }
        }

        let Some(endpoint) = self.repository.used_endpoint(source_hash).await? else {
            return Ok(DeliveryStatus::Pending);
        };
        match self.node.mempool(&endpoint).await {
            Ok(pool) if pool.contains(&tx) => Ok(DeliveryStatus::Pending),
            Ok(_) => {
                warn!(
                    "{} payment {} for {} is not on chain nor in the {} mempool, broadcast likely failed",
                    self.config.name, tx, source_hash, endpoint
                );
                Ok(DeliveryStatus::Dropped(tx))
            }
            Err(e) => {
                warn!("Mempool of {} unavailable: {}", endpoint, e);
                Ok(DeliveryStatus::Pending)
            }
        }
    }
}
