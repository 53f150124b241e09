//! Operator wallet: builds, signs and broadcasts payments with retry

use super::erc20;
use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::{ChainProvider, EvmNode, GasPrice, Payment, SendOutcome};
use crate::error::{BridgeError, BridgeResult};
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EthereumClient {
    provider: Arc<ChainProvider>,
    wallet: LocalWallet,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    retry: RetryPolicy,
}

impl EthereumClient {
    pub async fn new(
        provider: Arc<ChainProvider>,
        key: &str,
        retry: RetryPolicy,
    ) -> BridgeResult<Self> {
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Wallet(format!("Invalid private key: {}", e)))?
            .with_chain_id(provider.chain_id());
        let nonce_manager = NonceManager::new(provider.platform(), wallet.address());

        if let Err(e) = nonce_manager.init(&provider).await {
            warn!("Failed to init nonce for {}: {}", provider.platform(), e);
        }
        info!(
            "{} payments signed by {:?}",
            provider.platform(),
            wallet.address()
        );

        Ok(Self {
            provider,
            wallet,
            nonce_manager,
            gas_estimator: GasEstimator::new(),
            retry,
        })
    }

    fn build_payment_tx(
        &self,
        payment: &Payment,
        nonce: u64,
        gas_limit: U256,
        gas_price: &GasPrice,
    ) -> TypedTransaction {
        let (to, value, data) = match payment.token {
            Some(contract) => (
                contract,
                U256::zero(),
                erc20::encode_transfer(payment.to, payment.amount),
            ),
            None => (payment.to, payment.amount, Bytes::new()),
        };

        match gas_price {
            GasPrice::Legacy(price) => {
                let tx = TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(to)
                    .value(value)
                    .data(data)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .gas_price(*price)
                    .chain_id(self.provider.chain_id());
                TypedTransaction::Legacy(tx)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let tx = Eip1559TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(to)
                    .value(value)
                    .data(data)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(self.provider.chain_id());
                TypedTransaction::Eip1559(tx)
            }
        }
    }

    async fn ensure_balance(&self, payment: &Payment, gas_limit: U256, gas_price: &GasPrice) -> BridgeResult<()> {
        let balance = self.provider.get_balance(self.wallet.address()).await?;
        let mut need = GasEstimator::calculate_cost(gas_limit, gas_price);
        if payment.token.is_none() {
            need = need.saturating_add(payment.amount);
        }
        if balance < need {
            return Err(BridgeError::InsufficientBalance {
                platform: self.provider.platform().to_string(),
                have: balance.to_string(),
                need: need.to_string(),
            });
        }
        Ok(())
    }

    /// Sign once, then resend the same bytes until a node takes them.
    ///
    /// Once a send may have reached a node, later refusals cannot prove the
    /// payment absent, so the hash is returned as unconfirmed.
    async fn send_with_retry(&self, tx: TypedTransaction) -> BridgeResult<SendOutcome> {
        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| BridgeError::Wallet(e.to_string()))?;
        let tx_hash = tx.hash(&signature);
        let raw = tx.rlp_signed(&signature);

        let max_attempts = self.retry.max_attempts;
        let mut last_error = None;
        let mut maybe_sent = false;

        for attempt in 0..max_attempts {
            match timeout(SEND_TIMEOUT, self.provider.send_raw_transaction(raw.clone())).await {
                Ok(Ok(hash)) => {
                    info!(
                        "Transaction sent: {:?} (attempt {}/{})",
                        hash,
                        attempt + 1,
                        max_attempts
                    );
                    return Ok(SendOutcome::Accepted(hash));
                }
                Ok(Err(BridgeError::Transaction(error_msg))) => match refusal(&error_msg, maybe_sent) {
                    Refusal::AlreadyKnown => {
                        debug!("{:?} already in the mempool", tx_hash);
                        return Ok(SendOutcome::Accepted(tx_hash));
                    }
                    Refusal::AfterUnansweredSend => {
                        warn!("{:?} refused after an unanswered send: {}", tx_hash, error_msg);
                        return Ok(SendOutcome::Unconfirmed(tx_hash));
                    }
                    Refusal::NonceTooLow => {
                        warn!("Nonce too low, syncing");
                        self.nonce_manager.sync(&self.provider).await?;
                        return Err(BridgeError::Nonce {
                            platform: self.provider.platform().to_string(),
                            message: "Nonce too low".to_string(),
                        });
                    }
                    Refusal::InsufficientFunds => {
                        return Err(BridgeError::InsufficientBalance {
                            platform: self.provider.platform().to_string(),
                            have: "unknown".to_string(),
                            need: "unknown".to_string(),
                        });
                    }
                    Refusal::Other => last_error = Some(BridgeError::Transaction(error_msg)),
                },
                Ok(Err(e)) => {
                    warn!("Transaction send failed without a node answer: {}", e);
                    maybe_sent = true;
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("Transaction send timeout (attempt {})", attempt + 1);
                    maybe_sent = true;
                    last_error = Some(BridgeError::Timeout {
                        operation: "send transaction".to_string(),
                    });
                }
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(self.retry.delay(attempt)).await;
            }
        }

        if maybe_sent {
            warn!("Treating {:?} as possibly broadcast after unanswered sends", tx_hash);
            return Ok(SendOutcome::Unconfirmed(tx_hash));
        }
        Err(last_error.unwrap_or_else(|| BridgeError::Transaction("Unknown error".to_string())))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Refusal {
    AlreadyKnown,
    /// An earlier attempt went unanswered; "nonce too low" here usually means it was mined
    AfterUnansweredSend,
    NonceTooLow,
    InsufficientFunds,
    Other,
}

fn refusal(message: &str, maybe_sent: bool) -> Refusal {
    if message.contains("already known") {
        Refusal::AlreadyKnown
    } else if maybe_sent {
        Refusal::AfterUnansweredSend
    } else if message.contains("nonce too low") {
        Refusal::NonceTooLow
    } else if message.contains("insufficient funds") {
        Refusal::InsufficientFunds
    } else {
        Refusal::Other
    }
}

#[async_trait]
impl EvmNode for EthereumClient {
    async fn block_number(&self) -> BridgeResult<u64> {
        self.provider.get_block_number().await
    }

    async fn send_payment(&self, payment: &Payment) -> BridgeResult<SendOutcome> {
        let gas_limit = self
            .gas_estimator
            .transfer_gas_limit(payment.token.is_some());
        let gas_price = self.gas_estimator.get_gas_price(&self.provider).await?;
        self.ensure_balance(payment, gas_limit, &gas_price).await?;

        let nonce = self.nonce_manager.next(&self.provider).await?;
        let tx = self.build_payment_tx(payment, nonce, gas_limit, &gas_price);

        match self.send_with_retry(tx).await {
            Ok(outcome) => {
                if let Err(e) = self.nonce_manager.mark_pending(nonce, outcome.tx_hash()).await {
                    warn!("Nonce {} not tracked: {}", nonce, e);
                }
                debug!(
                    "{} operator transactions in flight on {}",
                    self.nonce_manager.pending_count().await,
                    self.provider.platform()
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Payment with nonce {} failed: {}", nonce, e);
                self.nonce_manager.release(nonce).await;
                Err(e)
            }
        }
    }

    async fn receipt_status(&self, tx_hash: H256) -> BridgeResult<Option<bool>> {
        let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? else {
            return Ok(None);
        };
        self.nonce_manager.confirm(tx_hash).await;
        Ok(Some(receipt.status == Some(U64::from(1))))
    }
}
