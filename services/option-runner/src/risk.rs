//! Risk sizing - stake from balance and a fixed risk fraction

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::RiskConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid risk input: {0}")]
    InvalidInput(String),
}

/// Stake for one trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskDecision {
    pub stake: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskSizer {
    risk_fraction: f64,
    min_stake: Decimal,
    max_stake: Decimal,
}

impl RiskSizer {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            risk_fraction: config.risk_fraction,
            min_stake: config.min_stake,
            max_stake: config.max_stake,
        }
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    /// `balance * risk_fraction`, clamped to the broker's stake limits
    pub fn size(&self, balance: Decimal) -> Result<RiskDecision, RiskError> {
        let raw = size(balance, self.risk_fraction)?;
        let stake = raw.clamp(self.min_stake, self.max_stake);
        if stake > balance {
            return Err(RiskError::InvalidInput(format!(
                "balance {} cannot cover minimum stake {}",
                balance, stake
            )));
        }
        Ok(RiskDecision { stake })
    }
}

/// Unclamped stake: `balance * risk_fraction`
pub fn size(balance: Decimal, risk_fraction: f64) -> Result<Decimal, RiskError> {
    if balance <= Decimal::ZERO {
        return Err(RiskError::InvalidInput(format!(
            "balance must be positive, got {}",
            balance
        )));
    }
    if !(risk_fraction > 0.0 && risk_fraction < 1.0) {
        return Err(RiskError::InvalidInput(format!(
            "risk fraction must be in (0, 1), got {}",
            risk_fraction
        )));
    }
    let fraction = Decimal::from_f64(risk_fraction).ok_or_else(|| {
        RiskError::InvalidInput(format!("risk fraction {} is not representable", risk_fraction))
    })?;
    Ok((balance * fraction).normalize())
}
