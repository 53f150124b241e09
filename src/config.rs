//! Configuration management for the swap bridge
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{BridgeError, BridgeResult};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bridge: BridgeConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub native: NativeConfig,
    pub signer: SignerConfig,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub instance_id: String,
    pub tick_interval_ms: u64,
    pub health_check_interval_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,
    #[serde(default = "default_fee_cooldown_secs")]
    pub fee_cooldown_secs: i64,
}

/// Exponential backoff applied to foreign RPC and oracle reads
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            max_attempts: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Keep all state in memory (dry runs only, nothing survives a restart)
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// The platform hosting the bridge contracts
#[derive(Debug, Clone, Deserialize)]
pub struct NativeConfig {
    pub name: String,
    pub rpc_url: String,
    pub address: String,
    pub key: String,
    pub contract: String,
    pub min_fee: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    pub url: String,
    #[serde(default = "default_signer_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Neo,
    Ethereum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub kind: PlatformKind,
    pub rpc_urls: Vec<String>,
    /// Bridge-controlled deposit address on this chain
    pub address: String,
    /// Operator key (WIF for Neo, hex private key for Ethereum)
    pub key: String,
    /// First height to scan when no cursor is persisted yet
    #[serde(default)]
    pub interop_height: u64,
    #[serde(default)]
    pub confirmations: u64,
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    #[serde(default)]
    pub tokens: HashMap<String, TokenConfig>,
}

impl PlatformConfig {
    /// Block batch cap per scan round
    pub fn batch_size(&self) -> u64 {
        self.batch_size.unwrap_or(match self.kind {
            PlatformKind::Neo => 8,
            PlatformKind::Ethereum => 50,
        })
    }

    pub fn token(&self, symbol: &str) -> BridgeResult<&TokenConfig> {
        self.tokens
            .get(symbol)
            .ok_or_else(|| BridgeError::UnknownToken {
                platform: self.name.clone(),
                symbol: symbol.to_string(),
            })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    #[default]
    Eip1559,
}

/// Widest precision accepted for a token
pub const MAX_TOKEN_DECIMALS: u8 = 36;

/// Token as deployed on a foreign chain; no contract means the chain's own coin
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub contract: Option<String>,
    pub decimals: u8,
}

fn default_verify_attempts() -> u32 {
    10
}

fn default_verify_delay_ms() -> u64 {
    5_000
}

fn default_fee_cooldown_secs() -> i64 {
    60
}

fn default_signer_timeout_secs() -> u64 {
    30
}

fn default_max_gas_price_gwei() -> u64 {
    300
}

impl BridgeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("SWAP_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.platforms.is_empty() {
            return Err(BridgeError::Config(
                "At least one foreign platform must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if platform.name == self.native.name {
                return Err(BridgeError::Config(format!(
                    "Platform {} collides with the native platform name",
                    platform.name
                )));
            }
            if !seen.insert(platform.name.as_str()) {
                return Err(BridgeError::Config(format!(
                    "Duplicate platform {}",
                    platform.name
                )));
            }
            if platform.rpc_urls.is_empty() {
                return Err(BridgeError::Config(format!(
                    "Platform {} has no RPC URLs configured",
                    platform.name
                )));
            }
            if platform.batch_size() == 0 {
                return Err(BridgeError::Config(format!(
                    "Platform {} has a zero batch size",
                    platform.name
                )));
            }
            for (symbol, token) in &platform.tokens {
                if token.decimals > MAX_TOKEN_DECIMALS {
                    return Err(BridgeError::Config(format!(
                        "Token {} on {} has {} decimals, at most {} are supported",
                        symbol, platform.name, token.decimals, MAX_TOKEN_DECIMALS
                    )));
                }
                if let Some(contract) = &token.contract {
                    let digits = contract.strip_prefix("0x").unwrap_or(contract);
                    if digits.len() != 40 || hex::decode(digits).is_err() {
                        return Err(BridgeError::Config(format!(
                            "Token {} on {} has an invalid contract {}",
                            symbol, platform.name, contract
                        )));
                    }
                }
            }
            if platform.kind == PlatformKind::Ethereum && platform.chain_id == 0 {
                tracing::warn!("Platform {} has no chain_id - signing without replay protection", platform.name);
            }
        }

        Ok(())
    }

    /// Get platform config by name
    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// Names of every foreign platform
    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    toml::from_str(SAMPLE).expect("sample config parses")
}

#[cfg(test)]
const SAMPLE: &str = r#"
[bridge]
instance_id = "test"
tick_interval_ms = 1000
health_check_interval_secs = 30

[database]
url = "postgres://localhost/bridge"
max_connections = 4
min_connections = 1

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[native]
name = "native"
rpc_url = "http://localhost:7077/rpc"
address = "P2KoperatorAddress"
key = "operator"
contract = "interop"
min_fee = 100000

[signer]
url = "http://localhost:9000"

[[platforms]]
name = "neo"
kind = "neo"
rpc_urls = ["http://seed1:10332", "http://seed2:10332"]
address = "AbridgeNeoAddress"
key = "neo-operator"
interop_height = 100

[platforms.tokens.SOUL]
contract = "ed07cffad18f1308db51920d99a2af60ac66a7b3"
decimals = 8

[[platforms]]
name = "ethereum"
kind = "ethereum"
rpc_urls = ["http://localhost:8545"]
address = "0x1111111111111111111111111111111111111111"
key = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
confirmations = 12
chain_id = 1

[platforms.tokens.ETH]
decimals = 18

[platforms.tokens.USDT]
contract = "0xdac17f958d2ee523a2206206994597c13d831ec7"
decimals = 6
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("SWAP_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${SWAP_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_sample_settings_validate() {
        let settings = test_settings();
        settings.validate().unwrap();
        assert_eq!(settings.platform("neo").unwrap().batch_size(), 8);
        assert_eq!(settings.platform("ethereum").unwrap().batch_size(), 50);
        assert_eq!(settings.bridge.fee_cooldown_secs, 60);
    }

    #[test]
    fn test_duplicate_platform_is_fatal() {
        let mut settings = test_settings();
        let dup = settings.platforms[0].clone();
        settings.platforms.push(dup);
        let err = settings.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Duplicate platform neo"));
    }

    #[test]
    fn test_native_name_collision_is_fatal() {
        let mut settings = test_settings();
        settings.platforms[0].name = "native".to_string();
        assert!(matches!(settings.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_oversized_token_precision_is_fatal() {
        let mut settings = test_settings();
        let usdt = settings.platforms[1].tokens.get_mut("USDT").unwrap();
        usdt.decimals = 90;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("90 decimals"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        env::set_var("SWAP_TEST_DB", "postgres://db/bridge");
        let body = SAMPLE.replace("postgres://localhost/bridge", "${SWAP_TEST_DB}");
        file.write_all(body.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.database.url, "postgres://db/bridge");
        assert_eq!(settings.platform_names(), vec!["neo", "ethereum"]);
    }
}
