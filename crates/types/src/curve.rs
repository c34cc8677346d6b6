/// Curve and sale state types shared by the oracle, math, and engine components

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineResult};

// ============================================================================
// Curve State
// ============================================================================

/// Bonding-curve and sale state as read from the external ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurveState {
    /// Current curve price (funding currency per token)
    pub price: Decimal,

    /// Sale progress
    pub total_raised: Decimal,
    pub target_cap: Decimal,

    /// Per-wallet contribution band
    pub min_contribution: Decimal,
    pub max_contribution: Decimal,

    /// Sale phase flags
    pub is_buy_active: bool,
    pub is_claim_active: bool,
}

impl CurveState {
    /// Remaining global capacity before the sale is full
    pub fn remaining_capacity(&self) -> Decimal {
        self.target_cap - self.total_raised
    }

    /// Check the state invariants a well-formed ledger read must satisfy
    pub fn validate(&self) -> EngineResult<()> {
        if self.price <= Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "price",
                &self.price.to_string(),
                "greater than 0",
            ));
        }
        if self.total_raised < Decimal::ZERO || self.total_raised > self.target_cap {
            return Err(EngineError::invalid_parameter(
                "total_raised",
                &self.total_raised.to_string(),
                &format!("within [0, {}]", self.target_cap),
            ));
        }
        if self.min_contribution > self.max_contribution {
            return Err(EngineError::invalid_parameter(
                "min_contribution",
                &self.min_contribution.to_string(),
                &format!("at most max_contribution ({})", self.max_contribution),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Wallet Participation
// ============================================================================

/// Per-wallet sale participation snapshot.
///
/// `contributed` only ever grows (confirmed buys) and `has_claimed` only
/// ever flips to true (confirmed claim); the ledger enforces this, the
/// engine merely caches snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletParticipation {
    pub wallet: String,
    pub contributed: Decimal,
    pub is_whitelisted: bool,
    pub has_claimed: bool,
}

// ============================================================================
// Oracle Snapshots
// ============================================================================

/// Cached oracle value with staleness marking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot<T> {
    pub value: T,
    /// True when the last refresh failed and this is a served-from-cache value
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            stale: false,
            fetched_at: Utc::now(),
        }
    }
}
