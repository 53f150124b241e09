//! Ethereum adapter - coin and ERC-20 deposits in, locally signed payments out

mod client;
pub mod erc20;
mod gas;
mod nonce;
mod provider;

pub use client::EthereumClient;
pub use provider::{ChainProvider, GasPrice};

use super::{BlockScanner, ChainAdapter, VerifyPolicy};
use crate::config::PlatformConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::state::SwapRepository;
use crate::types::{DeliveryStatus, Hash, PendingSwap, TokenAmount};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use erc20::{format_address, parse_address};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub to: Address,
    /// ERC-20 contract, `None` for the chain's own coin
    pub token: Option<Address>,
    pub amount: U256,
}

/// Result of handing a signed payment to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A node acknowledged the transaction
    Accepted(H256),
    /// Replies were lost or arrived after the nonce was consumed; only the chain can tell
    Unconfirmed(H256),
}

impl SendOutcome {
    pub fn tx_hash(&self) -> H256 {
        match self {
            SendOutcome::Accepted(hash) | SendOutcome::Unconfirmed(hash) => *hash,
        }
    }
}

#[async_trait]
pub trait EvmNode: Send + Sync {
    async fn block_number(&self) -> BridgeResult<u64>;

    /// Sign and broadcast. An error means no node can hold the transaction.
    async fn send_payment(&self, payment: &Payment) -> BridgeResult<SendOutcome>;

    /// `Some(success)` once a receipt exists
    async fn receipt_status(&self, tx_hash: H256) -> BridgeResult<Option<bool>>;
}

pub struct EthereumAdapter {
    config: PlatformConfig,
    local_address: String,
    node: Arc<dyn EvmNode>,
    repository: Arc<dyn SwapRepository>,
    scanner: BlockScanner,
    verify: VerifyPolicy,
}

impl EthereumAdapter {
    /// Fails if the operator key does not control the configured address
    pub async fn new(
        config: PlatformConfig,
        node: Arc<dyn EvmNode>,
        repository: Arc<dyn SwapRepository>,
        scanner: BlockScanner,
        verify: VerifyPolicy,
    ) -> BridgeResult<Self> {
        let local_address = format_address(&parse_address(&config.address)?);
        let adapter = Self {
            config,
            local_address,
            node,
            repository,
            scanner,
            verify,
        };

        let resolved = adapter.resolve_local_address(&adapter.config.key).await?;
        if resolved != adapter.local_address {
            return Err(BridgeError::Config(format!(
                "{} key resolves to {} but {} is configured",
                adapter.config.name, resolved, adapter.local_address
            )));
        }
        Ok(adapter)
    }

    fn payment(&self, destination: &str, amount: &TokenAmount) -> BridgeResult<Payment> {
        let token = self.config.token(&amount.symbol)?;
        let contract = token.contract.as_deref().map(parse_address).transpose()?;
        Ok(Payment {
            to: parse_address(destination)?,
            token: contract,
            amount: amount.to_precision(token.decimals)?,
        })
    }
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn platform(&self) -> &str {
        &self.config.name
    }

    fn local_address(&self) -> &str {
        &self.local_address
    }

    async fn resolve_local_address(&self, key: &str) -> BridgeResult<String> {
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Wallet(format!("Invalid private key: {}", e)))?;
        Ok(format_address(&wallet.address()))
    }

    async fn scan(&self) -> BridgeResult<Vec<PendingSwap>> {
        self.scanner.scan(|| self.node.block_number()).await
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

        let payment = match self.payment(destination, amount) {
            Ok(payment) => payment,
            Err(e) => {
                warn!("Cannot pay {} on {}: {}", source_hash, self.config.name, e);
                return Ok(DeliveryStatus::NotBroadcast);
            }
        };

        let outcome = match self.node.send_payment(&payment).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Payment for {} not sent: {}", source_hash, e);
                return Ok(DeliveryStatus::NotBroadcast);
            }
        };

        let tx = Hash::from(outcome.tx_hash()).to_string();
        self.repository.set_in_progress(source_hash, &tx).await?;
        if let SendOutcome::Unconfirmed(_) = outcome {
            warn!(
                "Payment {} for {} on {} is unacknowledged, leaving it to verification",
                tx, source_hash, self.config.name
            );
            return Ok(DeliveryStatus::Pending);
        }
        info!(
            "Sent {} {} to {} on {} for {}",
            payment.amount, amount.symbol, destination, self.config.name, source_hash
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
            match self.node.receipt_status(tx.into()).await {
                Ok(Some(true)) => return Ok(DeliveryStatus::Confirmed(tx)),
                Ok(Some(false)) => {
                    warn!(
                        "{} payment {} for {} reverted, not retrying",
                        self.config.name, tx, source_hash
                    );
                    return Ok(DeliveryStatus::Rejected);
                }
                Ok(None) => {}
                Err(e) => warn!("Receipt for {} unavailable: {}", tx, e),
            }
            if attempt + 1 < self.verify.attempts {
                tokio::time::sleep(self.verify.delay).await;
            }
        }

        Ok(DeliveryStatus::Pending)
    }
}
