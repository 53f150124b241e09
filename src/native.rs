//! Native platform access: the interop contract that settles swaps and fees

use crate::config::NativeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::signer::{SignRequest, TransactionSigner};
use crate::types::{ChainSwap, Hash};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTxStatus {
    Confirmed,
    Pending,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NativeChain: Send + Sync {
    /// Native settlement hash recorded for a foreign source transaction
    async fn settlement(&self, source_platform: &str, source_hash: &Hash)
        -> BridgeResult<Option<Hash>>;

    /// Outbound swap record created on the native chain
    async fn swap(&self, source_hash: &Hash) -> BridgeResult<Option<ChainSwap>>;

    async fn swaps_for_address(&self, address: &str) -> BridgeResult<Vec<ChainSwap>>;

    /// Credit a foreign deposit on the native chain
    async fn settle_interop(&self, source_platform: &str, source_hash: &Hash) -> BridgeResult<Hash>;

    /// Reimburse the operator for a foreign delivery
    async fn settle_fee(&self, source_hash: &Hash, destination_hash: &Hash) -> BridgeResult<Hash>;

    async fn transaction_status(&self, hash: &Hash) -> BridgeResult<NativeTxStatus>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TransactionState {
    state: String,
}

pub struct NativeRpcClient {
    config: NativeConfig,
    client: reqwest::Client,
    signer: Arc<dyn TransactionSigner>,
}

impl NativeRpcClient {
    pub fn new(config: NativeConfig, signer: Arc<dyn TransactionSigner>) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            signer,
        })
    }

    /// Check the signing service controls the configured operator address
    pub async fn verify_operator(&self) -> BridgeResult<()> {
        let address = self.signer.address(&self.config.name, &self.config.key).await?;
        if address != self.config.address {
            return Err(BridgeError::Config(format!(
                "Native key resolves to {} but {} is configured",
                address, self.config.address
            )));
        }
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> BridgeResult<RpcResponse> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    fn response_value(&self, method: &str, response: RpcResponse) -> BridgeResult<Option<Value>> {
        if let Some(error) = response.error {
            return Err(BridgeError::Rpc {
                endpoint: self.config.rpc_url.clone(),
                message: format!("{} ({}): {}", method, error.code, error.message),
            });
        }
        Ok(response.result.filter(|v| !v.is_null()))
    }

    /// Read-only contract call
    async fn invoke<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> BridgeResult<Option<T>> {
        let response = self
            .call(
                "invokeContract",
                json!([self.config.contract, method, args]),
            )
            .await?;
        match self.response_value(method, response)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Signed contract call; returns the broadcast transaction hash
    async fn submit(&self, method: &str, args: Vec<Value>) -> BridgeResult<Hash> {
        let request = SignRequest::Invoke {
            contract: self.config.contract.clone(),
            method: method.to_string(),
            args,
            min_fee: self.config.min_fee,
        };
        let signed = self
            .signer
            .sign(&self.config.name, &self.config.key, &request)
            .await?;

        let response = self.call("sendRawTransaction", json!([signed.raw])).await?;
        let hash = match self.response_value("sendRawTransaction", response)? {
            Some(Value::String(s)) => s.parse()?,
            _ => signed.hash,
        };
        info!("Submitted native {} transaction {}", method, hash);
        Ok(hash)
    }
}

#[async_trait]
impl NativeChain for NativeRpcClient {
    async fn settlement(
        &self,
        source_platform: &str,
        source_hash: &Hash,
    ) -> BridgeResult<Option<Hash>> {
        self.invoke(
            "getSettlement",
            vec![json!(source_platform), json!(source_hash)],
        )
        .await
    }

    async fn swap(&self, source_hash: &Hash) -> BridgeResult<Option<ChainSwap>> {
        self.invoke("getSwap", vec![json!(source_hash)]).await
    }

    async fn swaps_for_address(&self, address: &str) -> BridgeResult<Vec<ChainSwap>> {
        Ok(self
            .invoke("getSwapsForAddress", vec![json!(address)])
            .await?
            .unwrap_or_default())
    }

    async fn settle_interop(&self, source_platform: &str, source_hash: &Hash) -> BridgeResult<Hash> {
        self.submit(
            "settleTransaction",
            vec![json!(source_platform), json!(source_hash)],
        )
        .await
    }

    async fn settle_fee(&self, source_hash: &Hash, destination_hash: &Hash) -> BridgeResult<Hash> {
        self.submit(
            "settleFee",
            vec![json!(source_hash), json!(destination_hash)],
        )
        .await
    }

    async fn transaction_status(&self, hash: &Hash) -> BridgeResult<NativeTxStatus> {
        let response = self.call("getTransaction", json!([hash])).await?;
        if let Some(error) = &response.error {
            if error.message.to_lowercase().contains("pending") {
                debug!("Native transaction {} still pending", hash);
                return Ok(NativeTxStatus::Pending);
            }
        }
        let value = self
            .response_value("getTransaction", response)?
            .ok_or_else(|| BridgeError::Transaction(format!("native transaction {} unknown", hash)))?;
        let tx: TransactionState = serde_json::from_value(value)?;
        match tx.state.as_str() {
            "Halt" | "HALT" => Ok(NativeTxStatus::Confirmed),
            "Pending" => Ok(NativeTxStatus::Pending),
            other => Err(BridgeError::Transaction(format!(
                "native transaction {} ended in {}",
                hash, other
            ))),
        }
    }
}
