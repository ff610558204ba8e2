//! Shared types for the HashPredict agent.
//!
//! These types form the data model used across all modules.
//! They are kept free of chain and agent logic so that the `chain`,
//! `market` and `agent` modules can depend on them without cycles.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Octas per APT (the chain's 8-decimal base unit).
pub const OCTAS_PER_APT: u64 = 100_000_000;

/// Convert an octa amount to APT for display.
pub fn octas_to_apt(octas: u64) -> Decimal {
    Decimal::from_i128_with_scale(octas as i128, 8).normalize()
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Lifecycle state of an on-chain prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketState {
    /// `state.value == 0` on chain.
    Active,
    /// Any other state value (resolved, cancelled, ...).
    Other(u8),
}

impl MarketState {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => MarketState::Active,
            other => MarketState::Other(other),
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketState::Active => write!(f, "active"),
            MarketState::Other(v) => write!(f, "state-{v}"),
        }
    }
}

/// A binary prediction market read from the `hashpredictalpha` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: u64,
    pub description: String,
    pub yes_votes: u64,
    pub no_votes: u64,
    /// Unix seconds.
    pub end_time: i64,
    pub state: MarketState,
    #[serde(default)]
    pub yes_price: Option<u64>,
    #[serde(default)]
    pub no_price: Option<u64>,
    #[serde(default)]
    pub total_bet: Option<u64>,
}

impl Market {
    pub fn total_votes(&self) -> u64 {
        self.yes_votes.saturating_add(self.no_votes)
    }

    /// Fraction of votes on YES, or `None` if nobody has voted yet.
    pub fn yes_fraction(&self) -> Option<f64> {
        let total = self.total_votes();
        if total == 0 {
            None
        } else {
            Some(self.yes_votes as f64 / total as f64)
        }
    }

    pub fn end_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.end_time, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Active state and an end time strictly in the future.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.state == MarketState::Active && self.end_time > now.timestamp()
    }

    /// Helper to build a test market with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: u64) -> Self {
        Market {
            id,
            description: format!("Will sample market {id} resolve YES?"),
            yes_votes: 0,
            no_votes: 0,
            end_time: (Utc::now() + chrono::Duration::days(7)).timestamp(),
            state: MarketState::Active,
            yes_price: None,
            no_price: None,
            total_bet: None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} (yes: {} | no: {} | {} | ends {})",
            self.id,
            self.description,
            self.yes_votes,
            self.no_votes,
            self.state,
            self.end_datetime().to_rfc3339(),
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The side an account votes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Yes,
    No,
}

impl Verdict {
    /// The on-chain `bool` argument of `predict`.
    pub fn as_bool(&self) -> bool {
        matches!(self, Verdict::Yes)
    }
}

impl From<bool> for Verdict {
    fn from(value: bool) -> Self {
        if value {
            Verdict::Yes
        } else {
            Verdict::No
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Yes => write!(f, "Yes"),
            Verdict::No => write!(f, "No"),
        }
    }
}

/// Setup status of a managed account. Only ever moves `Unset -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountStatus {
    #[default]
    Unset,
    Ready,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Unset => write!(f, "unset"),
            AccountStatus::Ready => write!(f, "ready"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

/// Cooldown information for one cached vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextAvailable {
    /// `<market id>-<address>`
    pub key: String,
    pub next_available_in_minutes: f64,
}

/// Point-in-time snapshot of the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub accounts_count: usize,
    pub ready_accounts: usize,
    pub predictions_processed: usize,
    pub next_available_predictions: Vec<NextAvailable>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "running={} accounts={} ready={} cached_votes={}",
            self.running, self.accounts_count, self.ready_accounts, self.predictions_processed,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Chain API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected view result from {function}: {message}")]
    ViewDecode { function: String, message: String },

    #[error("Transaction {hash} failed: {vm_status}")]
    TransactionFailed { hash: String, vm_status: String },

    #[error("Transaction {0} not confirmed in time")]
    ConfirmationTimeout(String),

    #[error("Insufficient balance for {address}: need {needed} octas, have {available}")]
    InsufficientBalance {
        address: String,
        needed: u64,
        available: u64,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
