//! Configuration for the Poplar SDK.

use poplar_ipfs_client::IpfsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::address::Address;
use crate::amount::TokenAmount;
use crate::records::VALIDATION_PERIOD_SECS;

/// Local development deployment of the registry
pub const DEFAULT_REGISTRY_ADDRESS: Address = Address::from_bytes([
    0xe7, 0xf1, 0x72, 0x5e, 0x77, 0x34, 0xce, 0x28, 0x8f, 0x83, 0x67, 0xe1, 0xbb, 0x14, 0x3e,
    0x90, 0xbb, 0x3f, 0x05, 0x12,
]);

/// Local development deployment of the staking token
pub const DEFAULT_TOKEN_ADDRESS: Address = Address::from_bytes([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64,
    0x2f, 0x64, 0x18, 0x0a, 0xa3,
]);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level SDK configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoplarConfig {
    /// Ledger endpoint and contract addresses
    pub ledger: LedgerConfig,
    /// Content-store proxy
    pub content_store: ContentStoreConfig,
    /// Read polling
    pub polling: PollingConfig,
    /// Amounts and periods the registry enforces
    pub economics: EconomicsConfig,
}

impl PoplarConfig {
    /// Load and validate config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check values that would make the SDK misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };

        if !is_http_url(&self.ledger.rpc_url) {
            return invalid("ledger.rpc_url must be an http(s) URL");
        }
        if !is_http_url(&self.content_store.base_url) {
            return invalid("content_store.base_url must be an http(s) URL");
        }
        if self.content_store.base_url.ends_with('/') {
            return invalid("content_store.base_url must not end with '/'");
        }
        if self.ledger.registry_address.is_zero() || self.ledger.token_address.is_zero() {
            return invalid("contract addresses must be set");
        }
        if self.ledger.registry_address == self.ledger.token_address {
            return invalid("registry and token addresses must differ");
        }
        if self.polling.interval_ms == 0 {
            return invalid("polling.interval_ms must be positive");
        }
        if self.ledger.receipt_poll_interval_ms == 0 {
            return invalid("ledger.receipt_poll_interval_ms must be positive");
        }
        if self.economics.minimum_stake.is_zero() {
            return invalid("economics.minimum_stake must be positive");
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Ledger endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Registry contract (also the spender for allowances)
    pub registry_address: Address,
    /// Staking token contract
    pub token_address: Address,
    /// HTTP timeout per request (seconds)
    pub request_timeout_secs: u64,
    /// Delay between receipt polls (ms)
    pub receipt_poll_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            registry_address: DEFAULT_REGISTRY_ADDRESS,
            token_address: DEFAULT_TOKEN_ADDRESS,
            request_timeout_secs: 30,
            receipt_poll_interval_ms: 1000,
        }
    }
}

/// Content-store proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentStoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        let defaults = IpfsConfig::default();
        Self {
            base_url: defaults.base_url,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

impl ContentStoreConfig {
    pub fn to_client_config(&self) -> IpfsConfig {
        IpfsConfig {
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Read polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Refresh interval (ms); also the staleness bound of every projection
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Amounts and periods mirrored from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    /// Stake required by `submitProperty`
    pub minimum_stake: TokenAmount,
    /// Prefilled fee for validation requests
    pub default_validation_fee: TokenAmount,
    /// Stake lock after the last update (seconds)
    pub validation_period_secs: u64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            minimum_stake: TokenAmount::from_tokens(100),
            default_validation_fee: TokenAmount::from_tokens(100),
            validation_period_secs: VALIDATION_PERIOD_SECS,
        }
    }
}
