//! Allocation decision.
//!
//! Maps a portfolio snapshot and a tier table to a rebalancing decision.
//! Pure: no state, no I/O, same inputs give the same result.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{Action, AllocationResult, AllocationRule, PortfolioSnapshot, RebalanceError};

/// Minimum deviation (in quote currency) before a trade is recommended.
pub const TRADE_THRESHOLD: Decimal = dec!(1);

fn overflow(what: &str) -> RebalanceError {
    RebalanceError::InvalidInput(format!("{what} overflows decimal range"))
}

/// Value of the volatile holding in the quote currency.
pub fn volatile_value(snapshot: &PortfolioSnapshot) -> Result<Decimal, RebalanceError> {
    snapshot
        .volatile_qty
        .checked_mul(snapshot.price)
        .ok_or_else(|| overflow("volatile value"))
}

/// Total portfolio value: `volatile_qty * price + stable_qty`.
///
/// The ledger uses this too, so recorded totals always agree with what the
/// engine showed for the same snapshot.
pub fn total_value(snapshot: &PortfolioSnapshot) -> Result<Decimal, RebalanceError> {
    snapshot.validate()?;
    volatile_value(snapshot)?
        .checked_add(snapshot.stable_qty)
        .ok_or_else(|| overflow("total value"))
}

/// First rule (in priority order) whose band contains `price`, falling back
/// to the last rule. `None` only for an empty slice.
pub fn select_rule(rules: &[AllocationRule], price: Decimal) -> Option<&AllocationRule> {
    rules
        .iter()
        .find(|rule| rule.contains(price))
        .or_else(|| rules.last())
}

/// Compute the rebalancing decision for `snapshot` under `rules`.
///
/// Fails with `InvalidInput` for a bad snapshot or an empty rule slice and
/// with `NoData` when there is nothing to allocate.
pub fn evaluate(
    snapshot: &PortfolioSnapshot,
    rules: &[AllocationRule],
) -> Result<AllocationResult, RebalanceError> {
    snapshot.validate()?;
    let rule = select_rule(rules, snapshot.price)
        .ok_or_else(|| RebalanceError::InvalidInput("rule table is empty".to_string()))?;

    let current_volatile_value = volatile_value(snapshot)?;
    let current_stable_value = snapshot.stable_qty;
    let total_value = total_value(snapshot)?;
    if total_value.is_zero() {
        return Err(RebalanceError::NoData);
    }

    let current_volatile_fraction = current_volatile_value / total_value;
    let target_fraction = rule.target_fraction;

    let target_volatile_value = total_value
        .checked_mul(target_fraction)
        .ok_or_else(|| overflow("target volatile value"))?;
    let target_stable_value = total_value
        .checked_mul(Decimal::ONE - target_fraction)
        .ok_or_else(|| overflow("target stable value"))?;

    let diff = current_volatile_value - target_volatile_value;
    let (action, trade_amount_quote) = if diff > TRADE_THRESHOLD {
        (Action::Sell, diff)
    } else if diff < -TRADE_THRESHOLD {
        (Action::Buy, diff.abs())
    } else {
        (Action::Hold, Decimal::ZERO)
    };
    let trade_amount_base = trade_amount_quote / snapshot.price;

    debug!(
        price = %snapshot.price,
        total = %total_value,
        target = %target_fraction,
        %action,
        quote = %trade_amount_quote,
        "Allocation evaluated"
    );

    Ok(AllocationResult {
        current_volatile_value,
        current_stable_value,
        total_value,
        current_volatile_fraction,
        target_fraction,
        target_volatile_value,
        target_stable_value,
        action,
        trade_amount_quote,
        trade_amount_base,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
