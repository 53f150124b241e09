//! Ethereum block source: coin deposits and ERC-20 `Transfer` logs to the bridge

use super::BlockSource;
use crate::chain::ethereum::erc20::{self, format_address, parse_address};
use crate::chain::ethereum::ChainProvider;
use crate::config::PlatformConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{Hash, InteropBlock, InteropTransaction, InteropTransfer, TokenAmount};

use async_trait::async_trait;
use ethers::types::{Address, Filter, Transaction, H256, U64};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct TokenInfo {
    symbol: String,
    decimals: u8,
}

pub struct EthereumBlockSource {
    platform: String,
    provider: Arc<ChainProvider>,
    bridge: Address,
    coin: Option<TokenInfo>,
    tokens: HashMap<Address, TokenInfo>,
}

impl EthereumBlockSource {
    pub fn new(config: &PlatformConfig, provider: Arc<ChainProvider>) -> BridgeResult<Self> {
        let bridge = parse_address(&config.address)?;
        let mut coin = None;
        let mut tokens = HashMap::new();

        for (symbol, token) in &config.tokens {
            let info = TokenInfo {
                symbol: symbol.clone(),
                decimals: token.decimals,
            };
            match &token.contract {
                Some(contract) => {
                    tokens.insert(parse_address(contract)?, info);
                }
                None => coin = Some(info),
            }
        }

        Ok(Self {
            platform: config.name.clone(),
            provider,
            bridge,
            coin,
            tokens,
        })
    }

    fn oracle_error(&self, message: String) -> BridgeError {
        BridgeError::Oracle {
            platform: self.platform.clone(),
            message,
        }
    }

    fn is_coin_deposit(&self, tx: &Transaction) -> bool {
        self.coin.is_some() && tx.to == Some(self.bridge) && !tx.value.is_zero()
    }
}

#[async_trait]
impl BlockSource for EthereumBlockSource {
    async fn fetch_block(&self, height: u64) -> BridgeResult<InteropBlock> {
        let block = self
            .provider
            .get_block_with_txs(height)
            .await?
            .ok_or_else(|| self.oracle_error(format!("block {} not found", height)))?;
        let hash = block
            .hash
            .ok_or_else(|| self.oracle_error(format!("block {} is still pending", height)))?;

        // Keyed by position in the block so deposits keep chain order
        let mut relevant: BTreeMap<u64, H256> = BTreeMap::new();
        for tx in &block.transactions {
            if self.is_coin_deposit(tx) {
                let index = tx.transaction_index.unwrap_or_default().as_u64();
                relevant.insert(index, tx.hash);
            }
        }

        if !self.tokens.is_empty() {
            let filter = Filter::new()
                .from_block(height)
                .to_block(height)
                .address(self.tokens.keys().copied().collect::<Vec<_>>())
                .topic0(erc20::transfer_topic())
                .topic2(H256(erc20::address_word(&self.bridge)));
            for log in self.provider.get_logs(&filter).await? {
                if let (Some(tx_hash), Some(index)) = (log.transaction_hash, log.transaction_index) {
                    relevant.insert(index.as_u64(), tx_hash);
                }
            }
        }

        Ok(InteropBlock {
            platform: self.platform.clone(),
            height,
            hash: hash.into(),
            transactions: relevant.into_values().map(Hash::from).collect(),
        })
    }

    async fn fetch_transaction(&self, hash: &Hash) -> BridgeResult<InteropTransaction> {
        let tx_hash = H256::from(*hash);
        let tx = self
            .provider
            .get_transaction(tx_hash)
            .await?
            .ok_or_else(|| self.oracle_error(format!("transaction {} not found", hash)))?;
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| self.oracle_error(format!("transaction {} has no receipt", hash)))?;

        let mut transfers = Vec::new();
        if receipt.status == Some(U64::from(1)) {
            if let (true, Some(coin)) = (self.is_coin_deposit(&tx), &self.coin) {
                transfers.push(InteropTransfer {
                    source_address: format_address(&tx.from),
                    destination_address: format_address(&self.bridge),
                    interop_address: format_address(&tx.from),
                    amount: TokenAmount::new(coin.symbol.clone(), tx.value, coin.decimals),
                });
            }

            for log in &receipt.logs {
                let Some(token) = self.tokens.get(&log.address) else {
                    continue;
                };
                if let Some((from, to, value)) = erc20::decode_transfer_log(log) {
                    transfers.push(InteropTransfer {
                        source_address: format_address(&from),
                        destination_address: format_address(&to),
                        interop_address: format_address(&from),
                        amount: TokenAmount::new(token.symbol.clone(), value, token.decimals),
                    });
                }
            }
        }

        Ok(InteropTransaction {
            platform: self.platform.clone(),
            hash: *hash,
            transfers,
        })
    }
}
