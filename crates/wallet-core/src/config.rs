//! Wallet configuration with TOML file support.

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::keys::DEFAULT_LOOKAHEAD_WINDOW;
use crate::logging::LogFormat;
use crate::types::Chain;

/// Per-byte fee rates used when no exchange-rate source is configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Upper bound on USD-derived rates.
    #[serde(default = "default_max_fee")]
    pub max_fee: u64,

    #[serde(default = "default_priority_fee")]
    pub priority_fee: u64,

    #[serde(default = "default_normal_fee")]
    pub normal_fee: u64,

    #[serde(default = "default_economic_fee")]
    pub economic_fee: u64,
}

/// Configuration for one wallet instance.
///
/// Can be loaded from a TOML file via [`WalletConfig::from_toml_file`] or
/// built programmatically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_chain")]
    pub chain: Chain,

    #[serde(default)]
    pub fees: FeeConfig,

    /// Unused keys kept derived ahead of the last used one, per branch.
    #[serde(default = "default_lookahead_window")]
    pub lookahead_window: u32,

    /// Consensus branch id for Zcash signature hashes.
    #[serde(default = "default_zcash_branch_id")]
    pub zcash_branch_id: u32,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_max_fee() -> u64 {
    200
}

fn default_priority_fee() -> u64 {
    50
}

fn default_normal_fee() -> u64 {
    10
}

fn default_economic_fee() -> u64 {
    1
}

fn default_chain() -> Chain {
    Chain::Bitcoin
}

fn default_lookahead_window() -> u32 {
    DEFAULT_LOOKAHEAD_WINDOW
}

fn default_zcash_branch_id() -> u32 {
    chain_zec::network::DEFAULT_BRANCH_ID
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

// ── Impl ───────────────────────────────────────────────────────────────

impl WalletConfig {
    pub fn from_toml_file(path: &str) -> Result<Self, WalletError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WalletError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, WalletError> {
        toml::from_str(s).map_err(|e| WalletError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, WalletError> {
        toml::to_string_pretty(self).map_err(|e| WalletError::Config(e.to_string()))
    }

    /// Config for `chain` with every other field at its default.
    pub fn for_chain(chain: Chain) -> Self {
        Self {
            chain,
            ..Self::default()
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            max_fee: default_max_fee(),
            priority_fee: default_priority_fee(),
            normal_fee: default_normal_fee(),
            economic_fee: default_economic_fee(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            fees: FeeConfig::default(),
            lookahead_window: default_lookahead_window(),
            zcash_branch_id: default_zcash_branch_id(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}
