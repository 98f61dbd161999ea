//! Configuration management
//!
//! Settings come from an optional TOML file, `PEG_RISK__SECTION__KEY`
//! environment overrides and the well-known variables used by the fork
//! and Dune tooling (`ALCHEMY_MAINNET_URL`, `LOCAL_FORK_URL`,
//! `DUNE_API_KEY`, `DUNE_QUERY_ID`). A `.env` file is honoured.

use crate::error::{PegError, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

const ENV_PREFIX: &str = "PEG_RISK";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub dune: DuneConfig,
    #[serde(default)]
    pub curve: CurveConfig,
    #[serde(default)]
    pub withdraw: WithdrawConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Upstream mainnet RPC (Alchemy), also what anvil forks from
    #[serde(default)]
    pub mainnet_url: Option<String>,
    #[serde(default = "default_fork_url")]
    pub fork_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DuneConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub query_id: Option<u64>,
    #[serde(default = "default_dune_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Curve USDC/crvUSD pool and token addresses (Ethereum mainnet)
#[derive(Debug, Clone, Deserialize)]
pub struct CurveConfig {
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default = "default_usdc")]
    pub usdc: String,
    #[serde(default = "default_crvusd")]
    pub crvusd: String,
    /// Index of USDC in the pool (coins(0) = USDC, coins(1) = crvUSD)
    #[serde(default)]
    pub usdc_index: u8,
    /// Wallet holding LP tokens, impersonated on the fork
    #[serde(default = "default_lp_whale")]
    pub lp_whale: String,
    #[serde(default = "default_gas_funding_eth")]
    pub gas_funding_eth: f64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawConfig {
    /// Fraction of the holder's LP balance to burn
    #[serde(default = "default_fraction")]
    pub fraction: f64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Lag in rows (one row per day) for the basis change
    #[serde(default = "default_change_lag")]
    pub change_lag: usize,
    /// Rolling VaR lookback in rows
    #[serde(default = "default_window")]
    pub window: usize,
    /// Left-tail quantile, 0.01 => 99% VaR
    #[serde(default = "default_quantile")]
    pub quantile: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

fn default_fork_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_dune_url() -> String {
    "https://api.dune.com/api/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_pool() -> String {
    "0x4dece678ceceb27446b35c672dc7d61f30bad69e".to_string()
}
fn default_usdc() -> String {
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string()
}
fn default_crvusd() -> String {
    "0xf939e0a03fb07f59a73314e73794be0e57ac1b4e".to_string()
}
fn default_lp_whale() -> String {
    "0x9201da0D97CaAAff53f01B2fB56767C7072dE340".to_string()
}
fn default_gas_funding_eth() -> f64 {
    5.0
}
fn default_gas_limit() -> u64 {
    1_000_000
}
fn default_fraction() -> f64 {
    0.05
}
fn default_slippage_bps() -> u32 {
    50
}
fn default_change_lag() -> usize {
    14
}
fn default_window() -> usize {
    720
}
fn default_quantile() -> f64 {
    0.01
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("charts/publish")
}
fn default_output_file() -> String {
    "steth_eth_basis_var.html".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            mainnet_url: None,
            fork_url: default_fork_url(),
        }
    }
}

impl Default for DuneConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            query_id: None,
            base_url: default_dune_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            pool: default_pool(),
            usdc: default_usdc(),
            crvusd: default_crvusd(),
            usdc_index: 0,
            lp_whale: default_lp_whale(),
            gas_funding_eth: default_gas_funding_eth(),
            gas_limit: default_gas_limit(),
        }
    }
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            fraction: default_fraction(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            change_lag: default_change_lag(),
            window: default_window(),
            quantile: default_quantile(),
            output_dir: default_output_dir(),
            output_file: default_output_file(),
        }
    }
}

impl RiskConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }
}

impl Config {
    /// Load configuration from file, `.env` and process environment
    pub fn load(path: &str) -> Result<Self> {
        // A missing .env is fine; variables may come from the shell
        let _ = dotenvy::dotenv();
        Self::from_sources(path, |key| std::env::var(key).ok())
    }

    /// Build configuration with an explicit lookup for the well-known variables
    pub fn from_sources<F>(path: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let query_id = match lookup("DUNE_QUERY_ID") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                PegError::Config(format!(
                    "DUNE_QUERY_ID must be an integer, got: {:?}",
                    raw
                ))
            })?),
            None => None,
        };

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("rpc.mainnet_url", lookup("ALCHEMY_MAINNET_URL"))?
            .set_override_option("rpc.fork_url", lookup("LOCAL_FORK_URL"))?
            .set_override_option("dune.api_key", lookup("DUNE_API_KEY"))?
            .set_override_option("dune.query_id", query_id)?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and address formats
    pub fn validate(&self) -> Result<()> {
        let w = &self.withdraw;
        if !(w.fraction > 0.0 && w.fraction <= 1.0) {
            return Err(PegError::Config(format!(
                "withdraw.fraction must be in (0, 1], got {}",
                w.fraction
            )));
        }
        if w.slippage_bps > 10_000 {
            return Err(PegError::Config(format!(
                "withdraw.slippage_bps must be at most 10000, got {}",
                w.slippage_bps
            )));
        }

        let r = &self.risk;
        if r.window == 0 {
            return Err(PegError::Config("risk.window must be at least 1".to_string()));
        }
        if !(r.quantile > 0.0 && r.quantile < 1.0) {
            return Err(PegError::Config(format!(
                "risk.quantile must be in (0, 1), got {}",
                r.quantile
            )));
        }

        let c = &self.curve;
        if c.usdc_index > 1 {
            return Err(PegError::Config(format!(
                "curve.usdc_index must be 0 or 1 for a two-coin pool, got {}",
                c.usdc_index
            )));
        }
        for (name, addr) in [
            ("curve.pool", &c.pool),
            ("curve.usdc", &c.usdc),
            ("curve.crvusd", &c.crvusd),
            ("curve.lp_whale", &c.lp_whale),
        ] {
            parse_address(name, addr)?;
        }
        Ok(())
    }

    /// API key and query id for Dune, both required by the risk pipeline
    pub fn dune_credentials(&self) -> Result<(String, u64)> {
        let key = self
            .dune
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PegError::Config("DUNE_API_KEY must be set in your .env file".to_string()))?;
        let query_id = self
            .dune
            .query_id
            .ok_or_else(|| PegError::Config("DUNE_QUERY_ID must be set in your .env file".to_string()))?;
        Ok((key, query_id))
    }
}

/// Parse a hex address, naming the offending setting on failure
pub fn parse_address(name: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| PegError::Config(format!("{} is not a valid address ({}): {}", name, value, e)))
}
