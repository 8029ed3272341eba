//! Shared types for the rebalancer.
//!
//! These types form the data model used across all modules: the input
//! snapshot, the allocation tiers, the derived decision, and the recorded
//! cycles. Engine, ledger, storage and price suppliers all depend on this
//! module and never on each other's internals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Portfolio snapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of the holdings plus the current volatile price.
///
/// Built through [`PortfolioSnapshot::new`] or [`PortfolioSnapshot::from_text`],
/// both of which reject negative quantities and non-positive prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Units of the volatile asset held.
    pub volatile_qty: Decimal,
    /// Units of the stable asset held (1:1 with the quote currency).
    pub stable_qty: Decimal,
    /// Current price of one volatile unit in the quote currency.
    pub price: Decimal,
}

impl PortfolioSnapshot {
    /// Create a validated snapshot.
    pub fn new(
        volatile_qty: Decimal,
        stable_qty: Decimal,
        price: Decimal,
    ) -> Result<Self, RebalanceError> {
        let snapshot = Self { volatile_qty, stable_qty, price };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Build a snapshot from the quantity texts the user typed in.
    pub fn from_text(
        volatile_text: &str,
        stable_text: &str,
        price: Decimal,
    ) -> Result<Self, RebalanceError> {
        let volatile_qty = parse_quantity(volatile_text, "volatile quantity")?;
        let stable_qty = parse_quantity(stable_text, "stable quantity")?;
        Self::new(volatile_qty, stable_qty, price)
    }

    /// Check the snapshot constraints. Fields are public, so anything that
    /// arrives through deserialization goes through here again.
    pub fn validate(&self) -> Result<(), RebalanceError> {
        if self.price <= Decimal::ZERO {
            return Err(RebalanceError::InvalidInput(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if self.volatile_qty < Decimal::ZERO {
            return Err(RebalanceError::InvalidInput(format!(
                "volatile quantity must not be negative, got {}",
                self.volatile_qty
            )));
        }
        if self.stable_qty < Decimal::ZERO {
            return Err(RebalanceError::InvalidInput(format!(
                "stable quantity must not be negative, got {}",
                self.stable_qty
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PortfolioSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "volatile={} stable={} @ {}",
            self.volatile_qty, self.stable_qty, self.price
        )
    }
}

/// Parse a user-entered amount ("1.5", " 1500 ", "2e-3").
///
/// Empty text, `NaN`, `inf` and anything else that is not a finite decimal
/// number is rejected with `InvalidInput`.
pub fn parse_amount(text: &str, field: &str) -> Result<Decimal, RebalanceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RebalanceError::InvalidInput(format!("{field} is empty")));
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| RebalanceError::InvalidInput(format!("{field} is not a number: {trimmed:?}")))
}

/// Parse a held quantity: as [`parse_amount`], and never negative.
pub fn parse_quantity(text: &str, field: &str) -> Result<Decimal, RebalanceError> {
    let qty = parse_amount(text, field)?;
    if qty < Decimal::ZERO {
        return Err(RebalanceError::InvalidInput(format!(
            "{field} must not be negative, got {qty}"
        )));
    }
    Ok(qty)
}

// ---------------------------------------------------------------------------
// Allocation tiers
// ---------------------------------------------------------------------------

/// One price band of the allocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRule {
    /// Inclusive lower bound of the band.
    pub min_price: Decimal,
    /// Inclusive upper bound; `None` means unbounded.
    #[serde(default)]
    pub max_price: Option<Decimal>,
    /// Share of total value to hold in the volatile asset (0.0–1.0).
    #[serde(alias = "target")]
    pub target_fraction: Decimal,
}

impl AllocationRule {
    pub fn new(min_price: Decimal, max_price: Option<Decimal>, target_fraction: Decimal) -> Self {
        Self { min_price, max_price, target_fraction }
    }

    /// Whether `price` falls inside this band (both ends inclusive).
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min_price && self.max_price.map_or(true, |max| price <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_price.is_none()
    }
}

impl fmt::Display for AllocationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.target_fraction * Decimal::ONE_HUNDRED;
        match self.max_price {
            Some(max) => write!(f, "{} – {} → {:.2}%", self.min_price, max, pct),
            None => write!(f, "{} – ∞ → {:.2}%", self.min_price, pct),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Recommended rebalancing direction for the volatile asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Everything the engine derives from a snapshot and a rule table.
/// Never persisted; recompute it whenever the snapshot changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationResult {
    pub current_volatile_value: Decimal,
    pub current_stable_value: Decimal,
    pub total_value: Decimal,
    pub current_volatile_fraction: Decimal,
    pub target_fraction: Decimal,
    pub target_volatile_value: Decimal,
    pub target_stable_value: Decimal,
    pub action: Action,
    /// Trade size in the quote currency (0 when holding).
    pub trade_amount_quote: Decimal,
    /// Trade size in volatile units (0 when holding).
    pub trade_amount_base: Decimal,
}

impl fmt::Display for AllocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total=${:.0} | current {:.2}% → target {:.2}% | {}",
            self.total_value,
            self.current_volatile_fraction * Decimal::ONE_HUNDRED,
            self.target_fraction * Decimal::ONE_HUNDRED,
            self.action,
        )?;
        if self.action != Action::Hold {
            write!(
                f,
                " ${:.0} ({:.4})",
                self.trade_amount_quote,
                self.trade_amount_base,
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// What kind of portfolio event a cycle records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleKind {
    Deposit,
    Buy,
    Sell,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Deposit => write!(f, "DEPOSIT"),
            CycleKind::Buy => write!(f, "BUY"),
            CycleKind::Sell => write!(f, "SELL"),
        }
    }
}

/// One recorded cycle. Immutable once appended to the ledger.
///
/// Amounts are written as decimal strings so a saved ledger reloads
/// exactly. Plain JSON numbers are still accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub cycle_number: u64,
    #[serde(serialize_with = "rust_decimal::serde::str::serialize")]
    pub total_value_at_cycle: Decimal,
    pub kind: CycleKind,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "rust_decimal::serde::str::serialize")]
    pub price_at_cycle: Decimal,
    /// Absent on the opening deposit.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::str_option::serialize"
    )]
    pub profit_since_previous: Option<Decimal>,
    #[serde(serialize_with = "rust_decimal::serde::str::serialize")]
    pub volatile_qty_at_cycle: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::str::serialize")]
    pub stable_qty_at_cycle: Decimal,
}

impl fmt::Display for CycleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profit = match self.profit_since_previous {
            Some(p) if p > Decimal::ZERO => format!("+{p:.0}"),
            Some(p) => format!("{p:.0}"),
            None => "-".to_string(),
        };
        write!(
            f,
            "CYCLE {:>3} | {:>10} | {:<7} | {} | @ {:.0} | profit {}",
            self.cycle_number,
            format!("{:.0}", self.total_value_at_cycle),
            self.kind.to_string(),
            self.timestamp.format("%d/%m %H:%M"),
            self.price_at_cycle,
            profit,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures surfaced by the engine, the ledger and the price suppliers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebalanceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data: portfolio total value is zero")]
    NoData,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Price supplier unavailable ({supplier}): {message}")]
    SupplierUnavailable { supplier: String, message: String },
}

impl RebalanceError {
    pub fn supplier(supplier: impl Into<String>, message: impl Into<String>) -> Self {
        RebalanceError::SupplierUnavailable {
            supplier: supplier.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
