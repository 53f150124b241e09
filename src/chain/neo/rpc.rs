//! Neo JSON-RPC client over a list of seed endpoints

use super::{Broadcast, NeoNode};
use crate::config::PlatformConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::Hash;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Neo error code for an unknown transaction or block
const UNKNOWN_ITEM: i64 = -100;

/// Neo error code for a transaction the node already holds
const ALREADY_EXISTS: i64 = -501;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeoBlock {
    pub hash: String,
    pub index: u64,
    #[serde(default)]
    pub tx: Vec<NeoBlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeoBlockTransaction {
    pub txid: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationLog {
    pub txid: String,
    #[serde(default)]
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Execution {
    pub vmstate: String,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub contract: String,
    pub state: StackItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

pub struct NeoRpcClient {
    platform: String,
    endpoints: Vec<String>,
    client: reqwest::Client,
}

impl NeoRpcClient {
    pub fn new(config: &PlatformConfig) -> BridgeResult<Self> {
        if config.rpc_urls.is_empty() {
            return Err(BridgeError::Config(format!(
                "Platform {} has no RPC URLs configured",
                config.name
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            platform: config.name.clone(),
            endpoints: config.rpc_urls.clone(),
            client,
        })
    }

    /// Errors here are transport failures; node errors arrive in the response
    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> BridgeResult<RpcResponse<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        Ok(self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// `Ok(None)` when the node reports the item as unknown
    async fn call_optional<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> BridgeResult<Option<T>> {
        let response: RpcResponse<T> = self.request(endpoint, method, params).await?;

        match (response.result, response.error) {
            (_, Some(error)) if error.code == UNKNOWN_ITEM => Ok(None),
            (_, Some(error)) => Err(BridgeError::Rpc {
                endpoint: endpoint.to_string(),
                message: format!("{} ({}): {}", method, error.code, error.message),
            }),
            (Some(result), None) => Ok(Some(result)),
            (None, None) => Err(BridgeError::Rpc {
                endpoint: endpoint.to_string(),
                message: format!("{}: empty response", method),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> BridgeResult<T> {
        self.call_optional(endpoint, method, params)
            .await?
            .ok_or_else(|| BridgeError::Oracle {
                platform: self.platform.clone(),
                message: format!("{} returned unknown item", method),
            })
    }

    /// First endpoint that answers wins
    async fn call_any<T: DeserializeOwned>(&self, method: &str, params: Value) -> BridgeResult<T> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self.call(endpoint, method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!("{} failed on {}: {}", method, endpoint, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BridgeError::ChainConnection {
            platform: self.platform.clone(),
            message: "no endpoints".to_string(),
        }))
    }

    pub async fn get_block(&self, height: u64) -> BridgeResult<NeoBlock> {
        self.call_any("getblock", json!([height, 1])).await
    }

    pub async fn get_application_log(&self, hash: &Hash) -> BridgeResult<ApplicationLog> {
        self.call_any("getapplicationlog", json!([hash.to_prefixed()]))
            .await
    }
}

#[async_trait]
impl NeoNode for NeoRpcClient {
    async fn block_count(&self) -> BridgeResult<u64> {
        self.call_any("getblockcount", json!([])).await
    }

    async fn transaction_height(&self, hash: &Hash) -> BridgeResult<Option<u64>> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self
                .call_optional(endpoint, "gettransactionheight", json!([hash.to_prefixed()]))
                .await
            {
                Ok(height) => return Ok(height),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| BridgeError::ChainConnection {
            platform: self.platform.clone(),
            message: "no endpoints".to_string(),
        }))
    }

    async fn mempool(&self, endpoint: &str) -> BridgeResult<Vec<Hash>> {
        let ids: Vec<String> = self.call(endpoint, "getrawmempool", json!([])).await?;
        ids.iter().map(|id| id.parse()).collect()
    }

    async fn broadcast(&self, raw: &str) -> Broadcast {
        let mut unanswered = None;
        for endpoint in &self.endpoints {
            let reply = self
                .request::<bool>(endpoint, "sendrawtransaction", json!([raw]))
                .await;
            match send_reply(reply) {
                SendReply::Accepted => return Broadcast::Accepted(endpoint.clone()),
                SendReply::Refused(reason) => warn!("{} refused transaction: {}", endpoint, reason),
                SendReply::Unknown(e) => {
                    warn!("Broadcast to {} ended without an answer: {}", endpoint, e);
                    if unanswered.is_none() {
                        unanswered = Some(endpoint.clone());
                    }
                }
            }
        }
        match unanswered {
            Some(endpoint) => Broadcast::Unconfirmed(endpoint),
            None => Broadcast::Refused,
        }
    }
}

enum SendReply {
    Accepted,
    Refused(String),
    /// The node may hold the transaction
    Unknown(BridgeError),
}

fn send_reply(reply: BridgeResult<RpcResponse<bool>>) -> SendReply {
    match reply {
        Err(e) => SendReply::Unknown(e),
        Ok(RpcResponse {
            error: Some(error), ..
        }) if error.code == ALREADY_EXISTS => SendReply::Accepted,
        Ok(RpcResponse {
            error: Some(error), ..
        }) => SendReply::Refused(format!("({}) {}", error.code, error.message)),
        Ok(RpcResponse {
            result: Some(true), ..
        }) => SendReply::Accepted,
        Ok(_) => SendReply::Refused("rejected".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: Value) -> BridgeResult<RpcResponse<bool>> {
        Ok(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_send_replies() {
        assert!(matches!(
            send_reply(response(json!({ "result": true }))),
            SendReply::Accepted
        ));
        assert!(matches!(
            send_reply(response(json!({ "error": { "code": -501, "message": "already exists" } }))),
            SendReply::Accepted
        ));
        assert!(matches!(
            send_reply(response(json!({ "error": { "code": -500, "message": "insufficient funds" } }))),
            SendReply::Refused(_)
        ));
        assert!(matches!(
            send_reply(response(json!({ "result": false }))),
            SendReply::Refused(_)
        ));
    }

    #[test]
    fn test_lost_reply_is_not_a_refusal() {
        let reply = send_reply(Err(BridgeError::Timeout {
            operation: "http://seed1:10332/".to_string(),
        }));
        assert!(matches!(reply, SendReply::Unknown(BridgeError::Timeout { .. })));
    }
}
