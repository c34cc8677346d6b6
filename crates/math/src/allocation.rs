/// Contribution clamping against the sale's two binding constraints:
/// the global remaining capacity and the per-wallet band.

use curvepad_types::{CurveState, WalletParticipation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a requested contribution was adjusted. Clamp outcomes are
/// annotated results, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampReason {
    /// Remaining pool capacity is smaller than the minimum ticket; the
    /// only legal contribution is exactly the remainder
    CapExhausted,
    BelowMinimum,
    AboveMaximum,
}

impl ClampReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClampReason::CapExhausted => "cap_exhausted",
            ClampReason::BelowMinimum => "below_minimum",
            ClampReason::AboveMaximum => "above_maximum",
        }
    }
}

/// A clamped contribution amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clamped {
    pub value: Decimal,
    pub reason: Option<ClampReason>,
}

impl Clamped {
    fn accepted(value: Decimal) -> Self {
        Self {
            value,
            reason: None,
        }
    }

    fn adjusted(value: Decimal, reason: ClampReason) -> Self {
        Self {
            value,
            reason: Some(reason),
        }
    }
}

/// Clamp a requested contribution to what the sale can legally accept.
///
/// Constraints, in order of precedence:
/// 1. `diff = target_cap - total_raised`. If `diff` is smaller than the
///    wallet's minimum ticket, the pool cannot fit a regular ticket and
///    the only legal contribution is exactly `diff` (`CapExhausted`).
/// 2. Otherwise the request is clamped into the wallet band
///    `[wallet_min, wallet_max]` where
///    `wallet_min = min(max_contribution - contributed, min_contribution)`
///    and `wallet_max = min(diff, max_contribution - contributed)`.
pub fn clamp(
    requested: Decimal,
    participation: &WalletParticipation,
    state: &CurveState,
) -> Clamped {
    let diff = state.remaining_capacity();
    let headroom = state.max_contribution - participation.contributed;
    let wallet_min = headroom.min(state.min_contribution);
    let wallet_max = diff.min(headroom);

    if diff < wallet_min {
        return Clamped::adjusted(diff, ClampReason::CapExhausted);
    }

    if requested < wallet_min {
        Clamped::adjusted(wallet_min, ClampReason::BelowMinimum)
    } else if requested > wallet_max {
        Clamped::adjusted(wallet_max, ClampReason::AboveMaximum)
    } else {
        Clamped::accepted(requested)
    }
}
