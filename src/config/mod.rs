//! Configuration for the swap cycling agent

pub mod rpc;

use crate::tokens::{addresses, Asset, TokenAmount};
use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use rpc::RpcConfig;

/// Environment variable names for per-deployment overrides
pub mod env_vars {
    pub const CHAIN_ID: &str = "CHAIN_ID";
    pub const BASE_TOKEN: &str = "BASE_TOKEN";
    pub const TARGET_TOKEN: &str = "TARGET_TOKEN";
    pub const ROUTER_ADDRESS: &str = "ROUTER_ADDRESS";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
}

/// Default target token traded against the base asset
const DEFAULT_TARGET_TOKEN: Address =
    alloy::primitives::address!("dd493377c2ac801639439dcc1c3c95474aec6a40");

/// Minimum output passed to the router on every swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SlippagePolicy {
    /// `amountOutMinimum = 0`: any execution price is accepted
    #[default]
    Unprotected,
    /// Fixed floors in smallest units of the asset being received
    Floor {
        buy_min_out: TokenAmount,
        sell_min_out: TokenAmount,
    },
}

impl SlippagePolicy {
    pub fn buy_min_out(&self) -> TokenAmount {
        match self {
            SlippagePolicy::Unprotected => TokenAmount::ZERO,
            SlippagePolicy::Floor { buy_min_out, .. } => *buy_min_out,
        }
    }

    pub fn sell_min_out(&self) -> TokenAmount {
        match self {
            SlippagePolicy::Unprotected => TokenAmount::ZERO,
            SlippagePolicy::Floor { sell_min_out, .. } => *sell_min_out,
        }
    }
}

/// How much the router is authorized to spend when an approval is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Approve `U256::MAX` once so later cycles skip the approval transaction
    #[default]
    Unlimited,
    /// Approve exactly the amount about to be swapped
    Exact,
}

impl ApprovalPolicy {
    pub fn approval_amount(&self, required: TokenAmount) -> TokenAmount {
        match self {
            ApprovalPolicy::Unlimited => TokenAmount::MAX,
            ApprovalPolicy::Exact => required,
        }
    }
}

/// Pair, router and per-swap parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Asset spent on buys and received on sells
    pub base_token: Asset,
    /// Asset bought and sold back each cycle
    pub target_token: Asset,
    /// Swap router (also the allowance spender)
    pub router: Address,
    /// Pool fee tier in hundredths of a basis point (100 = 0.01%)
    pub fee_tier: u32,
    /// Buy size per cycle in human units of the base token
    pub trade_notional: String,
    /// Seconds until a submitted swap expires on-chain
    pub deadline_secs: u64,
    #[serde(default)]
    pub slippage: SlippagePolicy,
    #[serde(default)]
    pub approval: ApprovalPolicy,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            base_token: Asset::new(addresses::WHYPE),
            target_token: Asset::new(DEFAULT_TARGET_TOKEN),
            router: addresses::HYPERSWAP_V3_ROUTER,
            fee_tier: 100,
            trade_notional: "50".to_string(),
            deadline_secs: 20 * 60,
            slippage: SlippagePolicy::default(),
            approval: ApprovalPolicy::default(),
        }
    }
}

/// Escalation into and out of sell-only mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Consecutive reverts that switch the agent into sell-only mode
    pub failure_threshold: u32,
    /// Cycles spent in sell-only mode before buying resumes
    pub sell_only_iterations: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            sell_only_iterations: 12,
        }
    }
}

/// Gas ceiling derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Share of the latest block's gas limit used as the working ceiling
    pub block_limit_percent: u64,
    /// Ceiling used when the block gas limit cannot be read
    pub fallback_ceiling: u64,
    /// Hard cap for approval transactions
    pub approval_cap: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            block_limit_percent: 40,
            fallback_ceiling: 800_000,
            approval_cap: 300_000,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Expected chain id; checked against the RPC endpoint at startup when set
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// RPC endpoint (the `RPC_URL` environment variable takes precedence)
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Seconds to wait for a receipt before treating the call as a transport failure
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub gas: GasConfig,
    /// Delay between cycles (milliseconds)
    pub check_interval_ms: u64,
    /// Delay after a buy before balances are read again (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Path to the JSONL trade journal
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_settle_delay_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: None,
            rpc_url: None,
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            trading: TradingConfig::default(),
            recovery: RecoveryConfig::default(),
            gas: GasConfig::default(),
            check_interval_ms: 1_000,
            settle_delay_ms: default_settle_delay_ms(),
            audit_log_path: None,
        }
    }
}

impl Config {
    /// Read the config file (or defaults), apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override addresses and chain id from the environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(env_vars::CHAIN_ID) {
            let chain_id = value
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("Invalid {}: {}", env_vars::CHAIN_ID, e)))?;
            self.chain_id = Some(chain_id);
        }
        if let Ok(value) = std::env::var(env_vars::BASE_TOKEN) {
            self.trading.base_token = value.parse()?;
        }
        if let Ok(value) = std::env::var(env_vars::TARGET_TOKEN) {
            self.trading.target_token = value.parse()?;
        }
        if let Ok(value) = std::env::var(env_vars::ROUTER_ADDRESS) {
            let router: Asset = value.parse()?;
            self.trading.router = router.address();
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let trading = &self.trading;
        if trading.base_token == trading.target_token {
            return Err(Error::Config(
                "base_token and target_token must differ".to_string(),
            ));
        }
        if trading.base_token.is_zero() || trading.target_token.is_zero() {
            return Err(Error::Config("token addresses must be non-zero".to_string()));
        }
        if trading.router == addresses::ZERO_ADDRESS {
            return Err(Error::Config("router address must be non-zero".to_string()));
        }
        if trading.fee_tier >= 1 << 24 {
            return Err(Error::Config(format!(
                "fee_tier {} does not fit in uint24",
                trading.fee_tier
            )));
        }
        if trading.deadline_secs == 0 {
            return Err(Error::Config("deadline_secs must be positive".to_string()));
        }
        if self.recovery.failure_threshold == 0 {
            return Err(Error::Config(
                "recovery.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.recovery.sell_only_iterations == 0 {
            return Err(Error::Config(
                "recovery.sell_only_iterations must be at least 1".to_string(),
            ));
        }
        if self.gas.block_limit_percent == 0 || self.gas.block_limit_percent > 100 {
            return Err(Error::Config(
                "gas.block_limit_percent must be within 1..=100".to_string(),
            ));
        }
        if self.gas.fallback_ceiling == 0 || self.gas.approval_cap == 0 {
            return Err(Error::Config(
                "gas.fallback_ceiling and gas.approval_cap must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// RPC settings resolved against the environment
    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig::from_env(self.rpc_url.as_deref(), self.confirmation_timeout_secs)
    }
}
