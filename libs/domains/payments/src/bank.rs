//! Simulated external bank.
//!
//! Stands in for a card processor: a fixed latency, a validation failure for
//! negative amounts and a random timeout independent of the request.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Insufficient funds: requested {requested}, limit {limit}")]
    InsufficientFunds { requested: i64, limit: i64 },

    #[error("Bank API timeout")]
    Timeout,
}

impl BankError {
    /// Permanent rejections will fail the same way on every retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BankError::InvalidAmount(_) | BankError::InsufficientFunds { .. }
        )
    }
}

/// External debit capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn debit(&self, order_id: &str, amount: i64) -> Result<(), BankError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankConfig {
    /// Delay applied to every debit
    pub latency: Duration,
    /// Probability in `[0, 1]` that a debit times out
    pub timeout_rate: f64,
    /// Largest amount the simulated account covers; `None` means unlimited
    pub max_debit: Option<i64>,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(500),
            timeout_rate: 0.1,
            max_debit: None,
        }
    }
}

impl BankConfig {
    /// Instant, always-available bank
    pub fn reliable() -> Self {
        Self {
            latency: Duration::ZERO,
            timeout_rate: 0.0,
            max_debit: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Out-of-range rates are clamped; NaN and infinities count as 0.
    pub fn with_timeout_rate(mut self, rate: f64) -> Self {
        self.timeout_rate = probability(rate);
        self
    }

    pub fn with_max_debit(mut self, limit: i64) -> Self {
        self.max_debit = Some(limit);
        self
    }
}

impl FromEnv for BankConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let latency_ms: u64 = env_parse("BANK_LATENCY_MS", "500")?;
        let timeout_rate: f64 = env_parse("BANK_TIMEOUT_RATE", "0.1")?;
        if !(0.0..=1.0).contains(&timeout_rate) {
            return Err(ConfigError::ParseError {
                key: "BANK_TIMEOUT_RATE".to_string(),
                details: format!("{} is not a probability", timeout_rate),
            });
        }
        let max_debit = match std::env::var("BANK_MAX_DEBIT") {
            Ok(_) => Some(env_parse("BANK_MAX_DEBIT", "0")?),
            Err(_) => None,
        };

        Ok(Self {
            latency: Duration::from_millis(latency_ms),
            timeout_rate,
            max_debit,
        })
    }
}

pub struct SimulatedBank {
    config: BankConfig,
}

impl SimulatedBank {
    pub fn new(config: BankConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }
}

#[async_trait]
impl PaymentGateway for SimulatedBank {
    async fn debit(&self, order_id: &str, amount: i64) -> Result<(), BankError> {
        tokio::time::sleep(self.config.latency).await;

        if amount < 0 {
            return Err(BankError::InvalidAmount(amount));
        }
        if let Some(limit) = self.config.max_debit
            && amount > limit
        {
            return Err(BankError::InsufficientFunds {
                requested: amount,
                limit,
            });
        }

        let timed_out = rand::rng().random_bool(probability(self.config.timeout_rate));
        if timed_out {
            return Err(BankError::Timeout);
        }

        info!(order_id = %order_id, amount, "Bank debit accepted");
        Ok(())
    }
}

fn probability(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
