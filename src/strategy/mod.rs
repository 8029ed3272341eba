//! Strategy: price-tier tables and the allocation decision.

pub mod allocation;
pub mod rules;

use rust_decimal::Decimal;

use crate::types::{AllocationResult, AllocationRule, PortfolioSnapshot, RebalanceError};
use rules::RuleTable;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The allocation engine for one asset: a validated tier table plus the
/// pure decision function.
///
/// Instantiate once at startup from configuration; call `evaluate` every
/// time the price or the holdings change.
#[derive(Debug, Clone)]
pub struct AllocationEngine {
    rules: RuleTable,
}

impl AllocationEngine {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    /// Access the tier table.
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// The tier that applies at `price` (used to highlight the active row).
    pub fn rule_for(&self, price: Decimal) -> &AllocationRule {
        self.rules.lookup(price)
    }

    /// Rebalancing decision for `snapshot`. See [`allocation::evaluate`].
    pub fn evaluate(&self, snapshot: &PortfolioSnapshot) -> Result<AllocationResult, RebalanceError> {
        allocation::evaluate(snapshot, self.rules.as_slice())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
