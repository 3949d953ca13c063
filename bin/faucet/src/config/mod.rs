use crate::chain::{LogWatcherConfig, ReactiveConfig, TransportConfig};
use crate::claim::ClaimConfig;
use crate::eligibility::{EngineConfig, DEFAULT_BALANCE_CAP, DEFAULT_COOLDOWN_SECS};
use crate::stats::DEFAULT_STATS_REFRESH_SECS;
use alloy_primitives::Address;
use common::amount::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Somnia testnet
pub const DEFAULT_CHAIN_ID: u64 = 50312;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingAddress(&'static str),
    InvalidAddress { field: &'static str, value: String },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingAddress(field) => write!(f, "{} is not configured", field),
            ConfigError::InvalidAddress { field, value } => {
                write!(f, "Invalid {}: {}", field, value)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub protocol: ProtocolConfig,
    pub eligibility: EligibilitySettings,
    pub claim: ClaimSettings,
    pub feed: FeedSettings,
    pub stats: StatsSettings,
    /// Carried for wallet integrations; the core does not use it
    pub wallet_connect_project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub request_address: String,
    pub handler_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Read cooldown and balance cap from the handler contract
    pub fetch_parameters: bool,
    pub default_cooldown_secs: u64,
    pub default_balance_cap: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    pub tick_interval_ms: u64,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSettings {
    pub display_window_ms: u64,
    pub receipt_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Typed contract log polling
    Watcher,
    /// Raw WebSocket log push with manual decoding
    Reactive,
}

impl FromStr for FeedMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watcher" => Ok(FeedMode::Watcher),
            "reactive" => Ok(FeedMode::Reactive),
            _ => Err(ConfigError::InvalidValue {
                key: "FEED_MODE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub mode: FeedMode,
    pub polling_interval_ms: u64,
    pub max_block_range: u64,
    pub reconnect_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub refresh_secs: u64,
}

impl FaucetConfig {
    pub async fn load_from_file(path: &Path) -> eyre::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `RPC_URL`, `WS_URL`, `FAUCET_REQUEST_ADDRESS`,
    /// `FAUCET_HANDLER_ADDRESS`, `WALLETCONNECT_PROJECT_ID` and `FEED_MODE`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(url) = lookup("WS_URL") {
            self.network.ws_url = url;
        }
        if let Some(address) = lookup("FAUCET_REQUEST_ADDRESS") {
            self.contracts.request_address = address;
        }
        if let Some(address) = lookup("FAUCET_HANDLER_ADDRESS") {
            self.contracts.handler_address = address;
        }
        if let Some(project_id) = lookup("WALLETCONNECT_PROJECT_ID") {
            self.wallet_connect_project_id = project_id;
        }
        if let Some(mode) = lookup("FEED_MODE") {
            match mode.parse() {
                Ok(mode) => self.feed.mode = mode,
                Err(e) => tracing::warn!("Ignoring override: {}", e),
            }
        }
        self
    }

    pub fn request_address(&self) -> Result<Address, ConfigError> {
        parse_address("contracts.request_address", &self.contracts.request_address)
    }

    pub fn handler_address(&self) -> Result<Address, ConfigError> {
        parse_address("contracts.handler_address", &self.contracts.handler_address)
    }

    pub fn transport_config(&self) -> Result<TransportConfig, ConfigError> {
        Ok(TransportConfig {
            request_address: self.request_address()?,
            handler_address: self.handler_address()?,
            fetch_parameters: self.protocol.fetch_parameters,
            receipt_poll_interval_ms: self.claim.receipt_poll_interval_ms,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_cooldown_secs: self.protocol.default_cooldown_secs,
            default_balance_cap: self.protocol.default_balance_cap,
            tick_interval_ms: self.eligibility.tick_interval_ms,
            poll_interval_secs: self.eligibility.poll_interval_secs,
        }
    }

    pub fn claim_config(&self) -> ClaimConfig {
        ClaimConfig {
            display_window_ms: self.claim.display_window_ms,
        }
    }

    pub fn log_watcher_config(&self) -> LogWatcherConfig {
        LogWatcherConfig {
            polling_interval_ms: self.feed.polling_interval_ms,
            max_block_range: self.feed.max_block_range,
        }
    }

    pub fn reactive_config(&self) -> ReactiveConfig {
        ReactiveConfig {
            ws_url: self.network.ws_url.clone(),
            reconnect_max_delay_ms: self.feed.reconnect_max_delay_ms,
            ..ReactiveConfig::default()
        }
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    let value = value.trim();
    if value.is_empty() || value == "0x" {
        return Err(ConfigError::MissingAddress(field));
    }
    let address = Address::from_str(value).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })?;
    if address == Address::ZERO {
        return Err(ConfigError::MissingAddress(field));
    }
    Ok(address)
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            contracts: ContractsConfig::default(),
            protocol: ProtocolConfig::default(),
            eligibility: EligibilitySettings::default(),
            claim: ClaimSettings::default(),
            feed: FeedSettings::default(),
            stats: StatsSettings::default(),
            wallet_connect_project_id: "demo".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.infra.testnet.somnia.network/".to_string(),
            ws_url: ReactiveConfig::default().ws_url,
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fetch_parameters: false,
            default_cooldown_secs: DEFAULT_COOLDOWN_SECS,
            default_balance_cap: DEFAULT_BALANCE_CAP,
        }
    }
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            tick_interval_ms: engine.tick_interval_ms,
            poll_interval_secs: engine.poll_interval_secs,
        }
    }
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            display_window_ms: ClaimConfig::default().display_window_ms,
            receipt_poll_interval_ms: TransportConfig::default().receipt_poll_interval_ms,
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        let watcher = LogWatcherConfig::default();
        Self {
            mode: FeedMode::Watcher,
            polling_interval_ms: watcher.polling_interval_ms,
            max_block_range: watcher.max_block_range,
            reconnect_max_delay_ms: ReactiveConfig::default().reconnect_max_delay_ms,
        }
    }
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            refresh_secs: DEFAULT_STATS_REFRESH_SECS,
        }
    }
}
