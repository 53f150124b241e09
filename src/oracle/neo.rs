//! Neo block source: NEP-5 `transfer` notifications from invocation transactions

use super::BlockSource;
use crate::chain::neo::address::{display_script_hash, parse_script_hash, script_hash_to_address};
use crate::chain::neo::rpc::{ApplicationLog, NeoRpcClient, StackItem};
use crate::config::PlatformConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{Hash, InteropBlock, InteropTransaction, InteropTransfer, TokenAmount};

use async_trait::async_trait;
use ethers::types::U256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const INVOCATION: &str = "InvocationTransaction";
const TRANSFER: &[u8] = b"transfer";

#[derive(Debug, Clone)]
struct TokenInfo {
    symbol: String,
    decimals: u8,
}

pub struct NeoBlockSource {
    platform: String,
    rpc: Arc<NeoRpcClient>,
    /// Keyed by display-order script hash without prefix
    tokens: HashMap<String, TokenInfo>,
}

impl NeoBlockSource {
    pub fn new(config: &PlatformConfig, rpc: Arc<NeoRpcClient>) -> BridgeResult<Self> {
        let mut tokens = HashMap::new();
        for (symbol, token) in &config.tokens {
            let contract = token.contract.as_deref().ok_or_else(|| {
                BridgeError::Config(format!(
                    "Token {} on {} needs a contract script hash",
                    symbol, config.name
                ))
            })?;
            tokens.insert(
                display_script_hash(&parse_script_hash(contract)?),
                TokenInfo {
                    symbol: symbol.clone(),
                    decimals: token.decimals,
                },
            );
        }

        Ok(Self {
            platform: config.name.clone(),
            rpc,
            tokens,
        })
    }

    fn transfers(&self, log: &ApplicationLog) -> Vec<InteropTransfer> {
        let mut transfers = Vec::new();
        for execution in log.executions.iter().filter(|e| e.vmstate.contains("HALT")) {
            for notification in &execution.notifications {
                let contract = notification.contract.trim_start_matches("0x").to_lowercase();
                let Some(token) = self.tokens.get(&contract) else {
                    continue;
                };
                match decode_transfer(&notification.state) {
                    Some((from, to, value)) => transfers.push(InteropTransfer {
                        source_address: from.clone(),
                        destination_address: to,
                        interop_address: from,
                        amount: TokenAmount::new(token.symbol.clone(), value, token.decimals),
                    }),
                    None => debug!("Skipping non-transfer notification in {}", log.txid),
                }
            }
        }
        transfers
    }
}

/// `["transfer", from, to, amount]` with script hashes as byte arrays
fn decode_transfer(state: &StackItem) -> Option<(String, String, U256)> {
    let items: Vec<StackItem> = serde_json::from_value(state.value.clone()).ok()?;
    if items.len() != 4 || stack_bytes(&items[0])? != TRANSFER {
        return None;
    }
    let from: [u8; 20] = stack_bytes(&items[1])?.try_into().ok()?;
    let to: [u8; 20] = stack_bytes(&items[2])?.try_into().ok()?;
    Some((
        script_hash_to_address(&from),
        script_hash_to_address(&to),
        stack_integer(&items[3])?,
    ))
}

fn stack_bytes(item: &StackItem) -> Option<Vec<u8>> {
    match item.kind.as_str() {
        "ByteArray" => hex::decode(item.value.as_str()?).ok(),
        _ => None,
    }
}

/// Integers arrive either as decimal strings or little-endian byte arrays
fn stack_integer(item: &StackItem) -> Option<U256> {
    match item.kind.as_str() {
        "Integer" => U256::from_dec_str(item.value.as_str()?).ok(),
        "ByteArray" => {
            let bytes = stack_bytes(item)?;
            if bytes.len() > 32 {
                return None;
            }
            Some(U256::from_little_endian(&bytes))
        }
        _ => None,
    }
}

#[async_trait]
impl BlockSource for NeoBlockSource {
    async fn fetch_block(&self, height: u64) -> BridgeResult<InteropBlock> {
        let block = self.rpc.get_block(height).await?;
        let transactions = block
            .tx
            .iter()
            .filter(|tx| tx.kind == INVOCATION)
            .map(|tx| tx.txid.parse())
            .collect::<BridgeResult<Vec<Hash>>>()?;

        Ok(InteropBlock {
            platform: self.platform.clone(),
            height: block.index,
            hash: block.hash.parse()?,
            transactions,
        })
    }

    async fn fetch_transaction(&self, hash: &Hash) -> BridgeResult<InteropTransaction> {
        let log = self.rpc.get_application_log(hash).await?;
        Ok(InteropTransaction {
            platform: self.platform.clone(),
            hash: *hash,
            transfers: self.transfers(&log),
        })
    }
}
