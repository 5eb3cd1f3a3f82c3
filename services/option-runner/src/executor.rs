//! Broker collaborators - trade placement, settlement and account balance
//!
//! The decision loop never talks to a broker directly. It goes through
//! [`TradeExecutor`] and [`Account`]; the paper broker and test mocks
//! implement both.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::Direction;

/// Broker-assigned trade identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary option order
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub symbol: String,
    pub direction: Direction,
    pub stake: Decimal,
    pub duration: Duration,
}

/// Result of one settlement poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement {
    Pending,
    /// Net profit; negative on a loss, zero on a refund
    Settled { profit: Decimal },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Broker unreachable: {0}")]
    Connectivity(String),

    #[error("No broker response within {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("Balance unavailable: {0}")]
    Unavailable(String),
}

/// Settled trade, reported for logging and session stats only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: TradeId,
    pub direction: Direction,
    pub stake: Decimal,
    pub profit: Decimal,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.profit > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.profit < Decimal::ZERO
    }
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Place an order, returning the broker's trade id
    async fn place(&self, request: &TradeRequest) -> Result<TradeId, ExecutorError>;

    /// Poll the settlement state of a placed trade
    async fn settlement(&self, trade_id: &TradeId) -> Result<Settlement, ExecutorError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait Account: Send + Sync {
    /// Current balance, fetched fresh on every call
    async fn balance(&self) -> Result<Decimal, AccountError>;
}
