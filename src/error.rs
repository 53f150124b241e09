//! Error types for the swap bridge

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chain connection error for {platform}: {message}")]
    ChainConnection { platform: String, message: String },

    #[error("RPC error from {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("Oracle error for {platform}: {message}")]
    Oracle { platform: String, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Nonce error for {platform}: {message}")]
    Nonce { platform: String, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Platform {0} is not configured")]
    UnknownPlatform(String),

    #[error("Unsupported token {symbol} on {platform}")]
    UnknownToken { platform: String, symbol: String },

    #[error("Invalid swap pairing {source_platform} -> {destination_platform}: one side must be the native platform")]
    InvalidPairing {
        source_platform: String,
        destination_platform: String,
    },

    #[error("Swap {0} not found")]
    SwapNotFound(String),

    #[error("Amount {value} cannot be expressed with {decimals} decimals")]
    AmountOverflow { value: String, decimals: u8 },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Insufficient balance on {platform}: have {have}, need {need}")]
    InsufficientBalance {
        platform: String,
        have: String,
        need: String,
    },

    #[error("Rate limited on {platform}")]
    RateLimited { platform: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ChainConnection { .. }
                | BridgeError::Rpc { .. }
                | BridgeError::Oracle { .. }
                | BridgeError::Database(_)
                | BridgeError::Timeout { .. }
                | BridgeError::RateLimited { .. }
        )
    }

    /// Errors that indicate a misconfiguration or a caller bug rather than a runtime race
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_)
                | BridgeError::UnknownPlatform(_)
                | BridgeError::InvalidPairing { .. }
                | BridgeError::Wallet(_)
        )
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        let endpoint = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if e.is_timeout() {
            BridgeError::Timeout { operation: endpoint }
        } else {
            BridgeError::Rpc {
                endpoint,
                message: e.to_string(),
            }
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
