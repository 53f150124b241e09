//! Operator transaction signing for the Neo and native platforms
//!
//! Keys for those chains never live in the bridge process; an external
//! signing service holds them and returns serialized transactions.

use crate::config::SignerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::Hash;

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignRequest {
    /// NEP-5 `transfer(from, to, amount)`
    TokenTransfer {
        contract: String,
        from: String,
        to: String,
        amount: U256,
    },
    /// Contract invocation on the native platform
    Invoke {
        contract: String,
        method: String,
        args: Vec<Value>,
        min_fee: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedTransaction {
    pub hash: Hash,
    /// Hex-encoded serialized transaction, ready for broadcast
    pub raw: String,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address controlled by `key` on `platform`
    async fn address(&self, platform: &str, key: &str) -> BridgeResult<String>;

    async fn sign(
        &self,
        platform: &str,
        key: &str,
        request: &SignRequest,
    ) -> BridgeResult<SignedTransaction>;
}

#[derive(Serialize)]
struct AddressQuery<'a> {
    platform: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct AddressReply {
    address: String,
}

#[derive(Serialize)]
struct SignQuery<'a> {
    platform: &'a str,
    key: &'a str,
    request: &'a SignRequest,
}

/// Signing service reached over HTTP
pub struct RemoteSigner {
    client: reqwest::Client,
    url: String,
}

impl RemoteSigner {
    pub fn new(config: &SignerConfig) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn signer_error(e: reqwest::Error) -> BridgeError {
        match BridgeError::from(e) {
            BridgeError::Rpc { message, .. } => BridgeError::Signer(message),
            other => other,
        }
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    async fn address(&self, platform: &str, key: &str) -> BridgeResult<String> {
        let reply: AddressReply = self
            .client
            .post(format!("{}/address", self.url))
            .json(&AddressQuery { platform, key })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::signer_error)?
            .json()
            .await
            .map_err(Self::signer_error)?;
        Ok(reply.address)
    }

    async fn sign(
        &self,
        platform: &str,
        key: &str,
        request: &SignRequest,
    ) -> BridgeResult<SignedTransaction> {
        let signed: SignedTransaction = self
            .client
            .post(format!("{}/sign", self.url))
            .json(&SignQuery {
                platform,
                key,
                request,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::signer_error)?
            .json()
            .await
            .map_err(Self::signer_error)?;
        debug!("Signed {} transaction {}", platform, signed.hash);
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_request_wire_format() {
        let request = SignRequest::Invoke {
            contract: "interop".into(),
            method: "settleTransaction".into(),
            args: vec![json!("neo")],
            min_fee: 100,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["kind"], "invoke");
        assert_eq!(value["method"], "settleTransaction");
        assert_eq!(value["min_fee"], 100);
    }
}
