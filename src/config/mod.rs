use crate::auth::{AuthError, L2Credentials};
use crate::builder::Custody;
use crate::signer::POLYGON_CHAIN_ID;
use crate::stream::{StreamConfig, DEFAULT_WS_URL};
use crate::wallet::{Wallet, WalletError};
use alloy::primitives::Address;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    MissingEnv(String),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// CLOB REST API base URL
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// CLOB WebSocket URL
    #[serde(default = "default_clob_ws_url")]
    pub ws_url: String,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Outbound proxies, tried in order. Empty = direct.
    #[serde(default)]
    pub proxies: Vec<String>,
}

/// Signing and L2 credentials. Secrets come from the environment, never the file.
#[derive(Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub api_passphrase: String,
    /// Funder wallet when orders are placed on behalf of a proxy/safe.
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    /// 0 = EOA, 1 = proxy, 2 = Gnosis Safe; higher values clamp to 2. Only
    /// read when `proxy_wallet` is set.
    #[serde(default = "default_signature_type")]
    pub signature_type: u8,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Open orders older than this are cancelled during reconciliation.
    #[serde(default = "default_max_order_age_secs")]
    pub max_order_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}
fn default_clob_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_signature_type() -> u8 {
    2
}
fn default_chain_id() -> u64 {
    POLYGON_CHAIN_ID
}
fn default_rpc_url() -> String {
    crate::onchain::DEFAULT_RPC_URL.to_string()
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_pong_timeout_secs() -> u64 {
    10
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_max_order_age_secs() -> u64 {
    24 * 60 * 60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            clob_url: default_clob_url(),
            ws_url: default_clob_ws_url(),
            timeout_secs: default_timeout_secs(),
            proxies: Vec::new(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
            proxy_wallet: None,
            signature_type: default_signature_type(),
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
        }
    }
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("WalletConfig")
            .field("private_key", &redact(&self.private_key))
            .field("api_key", &self.api_key)
            .field("api_secret", &redact(&self.api_secret))
            .field("api_passphrase", &redact(&self.api_passphrase))
            .field("proxy_wallet", &self.proxy_wallet)
            .field("signature_type", &self.signature_type)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_order_age_secs: default_max_order_age_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus environment; no file needed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay settings from `lookup`. Unset variables leave the current value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = var("PRIVATE_KEY") {
            self.wallet.private_key = v;
        }
        if let Some(v) = var("CLOB_API_KEY") {
            self.wallet.api_key = v;
        }
        if let Some(v) = var("CLOB_SECRET") {
            self.wallet.api_secret = v;
        }
        if let Some(v) = var("CLOB_PASSPHRASE") {
            self.wallet.api_passphrase = v;
        }
        if let Some(v) = var("PROXY_WALLET_ADDRESS") {
            self.wallet.proxy_wallet = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("SIGNATURE_TYPE") {
            self.wallet.signature_type = v.parse().map_err(|_| ConfigError::Invalid {
                key: "SIGNATURE_TYPE",
                value: v.clone(),
            })?;
        }
        if let Some(v) = var("POLYGON_CHAIN_ID") {
            self.wallet.chain_id = v.parse().map_err(|_| ConfigError::Invalid {
                key: "POLYGON_CHAIN_ID",
                value: v.clone(),
            })?;
        }
        if let Some(v) = var("POLYGON_RPC_URL") {
            self.wallet.rpc_url = v;
        }
        if let Some(v) = var("PROXY_URL") {
            self.exchange.proxies = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = var("CLOB_URL") {
            self.exchange.clob_url = v;
        }
        if let Some(v) = var("CLOB_WS_URL") {
            self.exchange.ws_url = v;
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.wallet.api_key.is_empty()
            && !self.wallet.api_secret.is_empty()
            && !self.wallet.api_passphrase.is_empty()
    }

    /// Everything needed to sign and place orders is present and parseable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallet.private_key.is_empty() {
            return Err(ConfigError::MissingEnv("PRIVATE_KEY".to_string()));
        }
        for (key, value) in [
            ("CLOB_API_KEY", &self.wallet.api_key),
            ("CLOB_SECRET", &self.wallet.api_secret),
            ("CLOB_PASSPHRASE", &self.wallet.api_passphrase),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingEnv(key.to_string()));
            }
        }
        self.signing_wallet()?;
        self.custody()?;
        Ok(())
    }

    pub fn signing_wallet(&self) -> Result<Wallet, ConfigError> {
        if self.wallet.private_key.is_empty() {
            return Err(ConfigError::MissingEnv("PRIVATE_KEY".to_string()));
        }
        Ok(Wallet::from_hex(&self.wallet.private_key)?)
    }

    pub fn custody(&self) -> Result<Custody, ConfigError> {
        match &self.wallet.proxy_wallet {
            None => Ok(Custody::Direct),
            Some(raw) => {
                let proxy_wallet: Address = raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "PROXY_WALLET_ADDRESS",
                    value: raw.clone(),
                })?;
                Ok(Custody::delegated(proxy_wallet, self.wallet.signature_type))
            }
        }
    }

    /// L2 credentials bound to the signing wallet's address.
    pub fn credentials(&self) -> Result<L2Credentials, ConfigError> {
        let address = self.signing_wallet()?.address();
        Ok(L2Credentials::new(
            &self.wallet.api_key,
            &self.wallet.api_secret,
            &self.wallet.api_passphrase,
            &address.to_string(),
        )?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange.timeout_secs)
    }

    pub fn max_order_age(&self) -> Duration {
        Duration::from_secs(self.ledger.max_order_age_secs)
    }

    pub fn stream_config(&self) -> StreamConfig {
        let s = &self.stream;
        StreamConfig {
            url: self.exchange.ws_url.clone(),
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
            ping_interval: Duration::from_secs(s.ping_interval_secs),
            pong_timeout: Duration::from_secs(s.pong_timeout_secs),
            write_timeout: Duration::from_secs(s.write_timeout_secs),
            connect_timeout: Duration::from_secs(s.connect_timeout_secs),
        }
    }
}
