/// Bonding-curve conversions between funding and token amounts
///
/// Every function rounds toward the user's disadvantage: amounts the
/// user receives round down, amounts the user must pay round up. This
/// keeps quotes from ever over-allocating against the pool.

use curvepad_types::{CurveState, EngineError, EngineResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places carried on token amounts
pub const TOKEN_SCALE: u32 = 18;

/// Decimal places carried on funding-currency amounts
pub const FUNDING_SCALE: u32 = 18;

/// Tokens received for a funding amount at the current curve price.
/// Rounds down: the user never receives more than the curve yields.
pub fn amount_to_tokens(funding: Decimal, state: &CurveState) -> EngineResult<Decimal> {
    if funding < Decimal::ZERO {
        return Err(EngineError::invalid_parameter(
            "funding",
            &funding.to_string(),
            "non-negative",
        ));
    }
    if state.price <= Decimal::ZERO {
        return Err(EngineError::division_by_zero("amount_to_tokens: curve price"));
    }
    let tokens = funding
        .checked_div(state.price)
        .ok_or_else(|| EngineError::math_overflow("amount_to_tokens"))?;
    Ok(tokens.round_dp_with_strategy(TOKEN_SCALE, RoundingStrategy::ToZero))
}

/// Funding received for selling a token amount at the current curve price.
/// Rounds down: the inverse of `amount_to_tokens` never favors the user.
pub fn tokens_to_amount(tokens: Decimal, state: &CurveState) -> EngineResult<Decimal> {
    if tokens < Decimal::ZERO {
        return Err(EngineError::invalid_parameter(
            "tokens",
            &tokens.to_string(),
            "non-negative",
        ));
    }
    let funding = tokens
        .checked_mul(state.price)
        .ok_or_else(|| EngineError::math_overflow("tokens_to_amount"))?;
    Ok(funding.round_dp_with_strategy(FUNDING_SCALE, RoundingStrategy::ToZero))
}

/// Funding required to end up holding `target_tokens`.
/// Rounds up: the user pays at least the curve cost.
pub fn cost_to_reach_target(target_tokens: Decimal, state: &CurveState) -> EngineResult<Decimal> {
    if target_tokens < Decimal::ZERO {
        return Err(EngineError::invalid_parameter(
            "target_tokens",
            &target_tokens.to_string(),
            "non-negative",
        ));
    }
    let funding = target_tokens
        .checked_mul(state.price)
        .ok_or_else(|| EngineError::math_overflow("cost_to_reach_target"))?;
    Ok(funding.round_dp_with_strategy(FUNDING_SCALE, RoundingStrategy::AwayFromZero))
}

/// Claimable token allocation for a launchpad contribution: the claim
/// amount scales linearly with the number of minimum tickets paid in.
/// Rounds down.
pub fn claim_allocation(
    contributed: Decimal,
    min_contribution: Decimal,
    claim_per_ticket: Decimal,
) -> EngineResult<Decimal> {
    if min_contribution <= Decimal::ZERO {
        return Err(EngineError::division_by_zero(
            "claim_allocation: min_contribution",
        ));
    }
    let tickets = contributed
        .checked_div(min_contribution)
        .ok_or_else(|| EngineError::math_overflow("claim_allocation"))?;
    let tokens = tickets
        .checked_mul(claim_per_ticket)
        .ok_or_else(|| EngineError::math_overflow("claim_allocation"))?;
    Ok(tokens.round_dp_with_strategy(TOKEN_SCALE, RoundingStrategy::ToZero))
}
