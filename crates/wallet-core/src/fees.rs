use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FeeConfig;
use crate::interfaces::ExchangeRates;

/// Average transaction size, in bytes, used to turn a USD target into a
/// per-byte rate.
const AVERAGE_TRANSACTION_SIZE: f64 = 226.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeLevel {
    Priority,
    Normal,
    Economic,
    FeeBump,
}

impl FeeLevel {
    /// Target spend for an average transaction, in US cents.
    pub fn target_usd_cents(&self) -> u64 {
        match self {
            FeeLevel::Priority => 50,
            FeeLevel::Normal => 10,
            FeeLevel::Economic => 1,
            FeeLevel::FeeBump => 100,
        }
    }
}

impl fmt::Display for FeeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeLevel::Priority => write!(f, "priority"),
            FeeLevel::Normal => write!(f, "normal"),
            FeeLevel::Economic => write!(f, "economic"),
            FeeLevel::FeeBump => write!(f, "fee bump"),
        }
    }
}

/// Per-byte fee rates. Prices fees in USD when an exchange-rate source is
/// available, otherwise falls back to the configured rates.
#[derive(Clone)]
pub struct FeeProvider {
    config: FeeConfig,
    rates: Option<Arc<dyn ExchangeRates>>,
}

impl FeeProvider {
    pub fn new(config: FeeConfig, rates: Option<Arc<dyn ExchangeRates>>) -> Self {
        Self { config, rates }
    }

    pub fn fee_per_byte(&self, level: FeeLevel) -> u64 {
        let Some(rates) = &self.rates else {
            return self.default_fee(level);
        };
        let rate = match rates.latest_rate("USD") {
            Ok(rate) if rate > 0.0 => rate,
            Ok(rate) => {
                warn!(rate, "unusable USD rate, using configured fee");
                return self.default_fee(level);
            }
            Err(e) => {
                warn!(error = %e, "no USD rate, using configured fee");
                return self.default_fee(level);
            }
        };

        let target_usd = level.target_usd_cents() as f64 / 100.0;
        let fee = ((target_usd / rate) * 100_000_000.0 / AVERAGE_TRANSACTION_SIZE) as u64;
        fee.clamp(1, self.config.max_fee.max(1))
    }

    fn default_fee(&self, level: FeeLevel) -> u64 {
        match level {
            FeeLevel::Priority => self.config.priority_fee,
            FeeLevel::Normal => self.config.normal_fee,
            FeeLevel::Economic => self.config.economic_fee,
            FeeLevel::FeeBump => self.config.priority_fee * 2,
        }
    }
}

impl fmt::Debug for FeeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeProvider")
            .field("config", &self.config)
            .field("rates", &self.rates.is_some())
            .finish()
    }
}
