//! Ethereum provider with multi-RPC support and automatic failover

use crate::config::{GasPriceStrategy, PlatformConfig};
use crate::error::{BridgeError, BridgeResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    config: PlatformConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    current_provider: AtomicUsize,
}

impl ChainProvider {
    pub fn new(config: PlatformConfig) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::ChainConnection {
                platform: config.name.clone(),
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.config.name, next);
    }

    /// Try each provider once, starting with the active one
    async fn with_failover<T, F>(&self, operation: &str, call: F) -> BridgeResult<T>
    where
        F: for<'a> Fn(&'a Provider<Http>) -> BoxFuture<'a, Result<T, ProviderError>>,
    {
        let mut last_error = String::new();
        for _ in 0..self.http_providers.len() {
            match call(self.http()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} failed on {}: {}", operation, self.config.name, e);
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(BridgeError::ChainConnection {
            platform: self.config.name.clone(),
            message: format!("All providers failed to {}: {}", operation, last_error),
        })
    }

    pub async fn get_block_number(&self) -> BridgeResult<u64> {
        let block = self
            .with_failover("get block number", |p| Box::pin(p.get_block_number()))
            .await?;
        Ok(block.as_u64())
    }

    pub async fn get_block_with_txs(
        &self,
        block_number: u64,
    ) -> BridgeResult<Option<Block<Transaction>>> {
        self.with_failover("get block", |p| Box::pin(p.get_block_with_txs(block_number)))
            .await
    }

    pub async fn get_transaction(&self, tx_hash: H256) -> BridgeResult<Option<Transaction>> {
        self.with_failover("get transaction", |p| Box::pin(p.get_transaction(tx_hash)))
            .await
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        self.with_failover("get receipt", |p| {
            Box::pin(p.get_transaction_receipt(tx_hash))
        })
        .await
    }

    pub async fn get_logs(&self, filter: &Filter) -> BridgeResult<Vec<Log>> {
        self.with_failover("get logs", |p| {
            let filter = filter.clone();
            Box::pin(async move { p.get_logs(&filter).await })
        })
        .await
    }

    pub async fn get_transaction_count(&self, address: Address) -> BridgeResult<u64> {
        let count = self
            .with_failover("get nonce", |p| {
                Box::pin(p.get_transaction_count(address, None))
            })
            .await?;
        Ok(count.as_u64())
    }

    pub async fn get_balance(&self, address: Address) -> BridgeResult<U256> {
        self.with_failover("get balance", |p| Box::pin(p.get_balance(address, None)))
            .await
    }

    /// Broadcast on the active provider only; a failover resend could double-spend a nonce.
    ///
    /// A node's refusal is `Transaction`; anything else leaves the outcome unknown.
    pub async fn send_raw_transaction(&self, raw: Bytes) -> BridgeResult<H256> {
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| match RpcError::as_error_response(&e) {
                Some(response) => BridgeError::Transaction(response.message.clone()),
                None => BridgeError::ChainConnection {
                    platform: self.config.name.clone(),
                    message: e.to_string(),
                },
            })?;
        Ok(pending.tx_hash())
    }

    /// Get current gas price based on chain strategy
    pub async fn get_gas_price(&self) -> BridgeResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| BridgeError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    async fn estimate_eip1559_fees(&self) -> BridgeResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| BridgeError::GasEstimation(e.to_string()))?
            .ok_or_else(|| BridgeError::GasEstimation("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| BridgeError::GasEstimation("No base fee in block".to_string()))?;

        let priority_fee = U256::from(2_000_000_000u64); // 2 gwei

        // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
        let max_fee = base_fee * 2 + priority_fee;

        let max_gwei = U256::from(self.config.max_gas_price_gwei) * U256::from(1_000_000_000u64);
        let max_fee = std::cmp::min(max_fee, max_gwei);

        Ok((max_fee, priority_fee))
    }

    pub fn platform(&self) -> &str {
        &self.config.name
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}

/// Gas price types
#[derive(Debug, Clone)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
