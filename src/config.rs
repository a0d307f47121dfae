//! Configuration management for the TON bridge executor
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::contracts::TreasuryKind;
use crate::error::{ExecutorError, ExecutorResult};
use crate::fees::ValueStrategy;
use crate::tx::QueryIdStrategy;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage reserve added on balance-adjusted routes (0.005 TON)
pub const DEFAULT_STORAGE_MARGIN: u128 = 5_000_000;

/// Default dust threshold (100 USDT with 6 decimals)
pub const DEFAULT_MIN_BRIDGE_AMOUNT: &str = "100000000";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub executor: ExecutorConfig,
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub routes: BTreeMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub poll_interval_secs: u64,
    /// Exit when any route fails during the run at startup
    pub abort_on_startup_failure: bool,
    pub tx_timeout_secs: u64,
    pub tx_poll_interval_ms: u64,
    /// Also check the treasury transaction caused by the bridge message
    pub verify_destination: bool,
    /// Re-read treasury fees when the snapshot is older than this; unset means never
    pub fee_snapshot_max_age_secs: Option<u64>,
    pub query_id: QueryIdStrategy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 600,
            abort_on_startup_failure: true,
            tx_timeout_secs: 90,
            tx_poll_interval_ms: 2_000,
            verify_destination: true,
            fee_snapshot_max_age_secs: None,
            query_id: QueryIdStrategy::Random,
        }
    }
}

impl ExecutorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }

    pub fn tx_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tx_poll_interval_ms)
    }

    pub fn fee_snapshot_max_age(&self) -> Option<Duration> {
        self.fee_snapshot_max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Clone, Deserialize)]
pub struct WalletConfig {
    /// 24-word mnemonic
    pub mnemonic: String,
    /// Deployed v3r2 wallet the mnemonic controls
    pub address: String,
    #[serde(default = "default_subwallet_id")]
    pub subwallet_id: u32,
    #[serde(default = "default_message_ttl_secs")]
    pub message_ttl_secs: u64,
}

fn default_subwallet_id() -> u32 {
    698_983_191
}

fn default_message_ttl_secs() -> u64 {
    60
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("mnemonic", &"<redacted>")
            .field("address", &self.address)
            .field("subwallet_id", &self.subwallet_id)
            .field("message_ttl_secs", &self.message_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9100,
        }
    }
}

/// How the attached value is computed for a route
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Fixed,
    BalanceAdjusted,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub kind: TreasuryKind,
    pub treasury_address: String,
    /// USDT jetton wallet whose balance gets bridged
    pub source_wallet_address: String,
    #[serde(default = "default_min_bridge_amount")]
    pub min_bridge_amount: String,
    /// Overrides the treasury kind's default strategy
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    #[serde(default)]
    pub storage_margin: Option<String>,
    /// Overrides the global wallet
    #[serde(default)]
    pub wallet: Option<WalletConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_min_bridge_amount() -> String {
    DEFAULT_MIN_BRIDGE_AMOUNT.to_string()
}

fn default_enabled() -> bool {
    true
}

impl RouteConfig {
    /// Dust threshold in jetton units
    pub fn min_bridge_amount(&self) -> ExecutorResult<u128> {
        parse_amount("min_bridge_amount", &self.min_bridge_amount)
    }

    /// Value strategy, falling back to the treasury kind's default
    pub fn value_strategy(&self) -> ExecutorResult<ValueStrategy> {
        let kind = self.strategy.unwrap_or(match self.kind.default_strategy() {
            ValueStrategy::Fixed => StrategyKind::Fixed,
            ValueStrategy::BalanceAdjusted { .. } => StrategyKind::BalanceAdjusted,
        });

        Ok(match kind {
            StrategyKind::Fixed => ValueStrategy::Fixed,
            StrategyKind::BalanceAdjusted => {
                let storage_margin = match &self.storage_margin {
                    Some(raw) => parse_amount("storage_margin", raw)?,
                    None => DEFAULT_STORAGE_MARGIN,
                };
                ValueStrategy::BalanceAdjusted { storage_margin }
            }
        })
    }
}

/// Parse a decimal-string encoded integer amount
pub fn parse_amount(field: &str, raw: &str) -> ExecutorResult<u128> {
    raw.trim()
        .parse::<u128>()
        .map_err(|e| ExecutorError::Config(format!("{} {:?} is not an integer: {}", field, raw, e)))
}

impl Settings {
    /// Load settings from `$BRIDGE_EXECUTOR_CONFIG` or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_EXECUTOR_CONFIG")
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
    fn validate(&self) -> Result<()> {
        if self.executor.poll_interval_secs == 0 {
            anyhow::bail!("executor.poll_interval_secs must be positive");
        }

        if self.chain.endpoints.is_empty() {
            anyhow::bail!("chain.endpoints must list at least one toncenter endpoint");
        }

        validate_wallet("wallet", &self.wallet)?;

        // At least one route must be enabled
        if self.enabled_routes().is_empty() {
            anyhow::bail!("At least one route must be enabled");
        }

        for (name, route) in self.enabled_routes() {
            if route.treasury_address.trim().is_empty() {
                anyhow::bail!("Route {} has no treasury address", name);
            }
            if route.source_wallet_address.trim().is_empty() {
                anyhow::bail!("Route {} has no source wallet address", name);
            }
            route
                .min_bridge_amount()
                .with_context(|| format!("Route {}", name))?;
            route
                .value_strategy()
                .with_context(|| format!("Route {}", name))?;
            if let Some(wallet) = &route.wallet {
                validate_wallet(&format!("routes.{}.wallet", name), wallet)?;
            }
            if route.strategy == Some(StrategyKind::Fixed) && route.storage_margin.is_some() {
                tracing::warn!("Route {} sets storage_margin on a fixed strategy - ignored", name);
            }
        }

        Ok(())
    }

    /// Get list of enabled routes, in name order
    pub fn enabled_routes(&self) -> Vec<(&String, &RouteConfig)> {
        self.routes.iter().filter(|(_, r)| r.enabled).collect()
    }

    /// Wallet used by a route
    pub fn wallet_for<'a>(&'a self, route: &'a RouteConfig) -> &'a WalletConfig {
        route.wallet.as_ref().unwrap_or(&self.wallet)
    }
}

fn validate_wallet(section: &str, wallet: &WalletConfig) -> Result<()> {
    if wallet.mnemonic.split_whitespace().count() == 0 {
        anyhow::bail!("{}.mnemonic is empty", section);
    }
    if wallet.address.trim().is_empty() {
        anyhow::bail!("{}.address is empty", section);
    }
    Ok(())
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");
    }

    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[executor]
poll_interval_secs = 300
abort_on_startup_failure = false

[chain]
endpoints = ["https://toncenter.com"]
api_key = "${BRIDGE_TEST_API_KEY}"

[wallet]
mnemonic = "${BRIDGE_TEST_MNEMONIC}"
address = "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"

[routes.ton_to_eth]
kind = "eth"
treasury_address = "0:1111111111111111111111111111111111111111111111111111111111111111"
source_wallet_address = "0:2222222222222222222222222222222222222222222222222222222222222222"

[routes.ton_to_tac]
kind = "tac"
treasury_address = "0:3333333333333333333333333333333333333333333333333333333333333333"
source_wallet_address = "0:4444444444444444444444444444444444444444444444444444444444444444"
min_bridge_amount = "250000000"

[routes.disabled]
kind = "tac"
treasury_address = "0:5555555555555555555555555555555555555555555555555555555555555555"
source_wallet_address = "0:6666666666666666666666666666666666666666666666666666666666666666"
enabled = false
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_sample_config() {
        env::set_var("BRIDGE_TEST_API_KEY", "secret-key");
        env::set_var("BRIDGE_TEST_MNEMONIC", "word ".repeat(24).trim());
        let file = write_config(SAMPLE);

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.executor.poll_interval(), Duration::from_secs(300));
        assert!(!settings.executor.abort_on_startup_failure);
        assert!(settings.executor.verify_destination);
        assert_eq!(settings.chain.api_key.as_deref(), Some("secret-key"));
        assert_eq!(settings.chain.max_retries, 5);
        assert_eq!(settings.wallet.subwallet_id, 698_983_191);

        let routes = settings.enabled_routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].0, "ton_to_eth");

        let eth = routes[0].1;
        assert_eq!(eth.min_bridge_amount().unwrap(), 100_000_000);
        assert_eq!(
            eth.value_strategy().unwrap(),
            ValueStrategy::BalanceAdjusted {
                storage_margin: DEFAULT_STORAGE_MARGIN
            }
        );

        let tac = routes[1].1;
        assert_eq!(tac.min_bridge_amount().unwrap(), 250_000_000);
        assert_eq!(tac.value_strategy().unwrap(), ValueStrategy::Fixed);
        assert_eq!(settings.wallet_for(tac).address, settings.wallet.address);
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        env::remove_var("BRIDGE_TEST_UNSET_MNEMONIC");
        let contents = SAMPLE.replace("BRIDGE_TEST_MNEMONIC", "BRIDGE_TEST_UNSET_MNEMONIC");
        let file = write_config(&contents);

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("mnemonic"));
    }

    #[test]
    fn test_bad_amount_fails_validation() {
        env::set_var("BRIDGE_TEST_MNEMONIC", "word ".repeat(24).trim());
        let contents = SAMPLE.replace("\"250000000\"", "\"lots\"");
        let file = write_config(&contents);

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn test_strategy_override() {
        let route = RouteConfig {
            kind: TreasuryKind::Tac,
            treasury_address: "0:00".into(),
            source_wallet_address: "0:00".into(),
            min_bridge_amount: DEFAULT_MIN_BRIDGE_AMOUNT.into(),
            strategy: Some(StrategyKind::BalanceAdjusted),
            storage_margin: Some("1000".into()),
            wallet: None,
            enabled: true,
        };
        assert_eq!(
            route.value_strategy().unwrap(),
            ValueStrategy::BalanceAdjusted {
                storage_margin: 1000
            }
        );
    }

    #[test]
    fn test_wallet_debug_redacts_mnemonic() {
        let wallet = WalletConfig {
            mnemonic: "very secret words".into(),
            address: "0:00".into(),
            subwallet_id: 1,
            message_ttl_secs: 60,
        };
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
