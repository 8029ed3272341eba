//! Price-tier allocation tables.
//!
//! A `RuleTable` is an ordered set of `AllocationRule`s that covers every
//! non-negative price exactly once. Tables are checked when they are built,
//! so the allocation engine never has to guess what a gap or an overlap was
//! supposed to mean.
//!
//! Tier ordering: highest `min_price` first. Adjacent tiers must touch
//! (`lower.max_price == upper.min_price`); the shared boundary price belongs
//! to the higher tier because it is scanned first.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::AllocationRule;

/// Widest hole between two tiers that `RuleTable::normalize` will close.
/// Covers legacy integer tables such as `..=139999` followed by `140000..`.
const MAX_CLOSABLE_GAP: Decimal = dec!(1);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
    #[error("rule table is empty")]
    Empty,

    #[error("tier {index}: target {target} is outside 0..=1")]
    TargetOutOfRange { index: usize, target: Decimal },

    #[error("tier {index}: min price {min} is negative")]
    NegativeMin { index: usize, min: Decimal },

    #[error("tier {index}: max price {max} is below min price {min}")]
    InvertedRange { index: usize, min: Decimal, max: Decimal },

    #[error("highest tier (from {min}) must have no upper bound")]
    BoundedTop { min: Decimal },

    #[error("tier starting at {min} is unbounded but is not the highest tier")]
    UnboundedBelowTop { min: Decimal },

    #[error("lowest tier starts at {min}; prices below it are not covered")]
    UncoveredBottom { min: Decimal },

    #[error("gap between {lower_max} and {upper_min}")]
    Gap { lower_max: Decimal, upper_min: Decimal },

    #[error("tiers overlap: {lower_max} reaches past {upper_min}")]
    Overlap { lower_max: Decimal, upper_min: Decimal },
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// A validated, exhaustive and non-overlapping tier table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<AllocationRule>,
}

impl RuleTable {
    /// Validate `rules` strictly. Input order does not matter; the table is
    /// stored highest tier first.
    pub fn new(mut rules: Vec<AllocationRule>) -> Result<Self, RuleTableError> {
        sort_descending(&mut rules);
        validate(&rules)?;
        debug!(tiers = rules.len(), "Rule table validated");
        Ok(Self { rules })
    }

    /// Repair legacy tables before validating them.
    ///
    /// Closes gaps of at most one price unit between adjacent tiers by
    /// raising the lower tier's max, and extends the lowest tier down to 0.
    /// Overlaps and wider gaps are still rejected.
    pub fn normalize(mut rules: Vec<AllocationRule>) -> Result<Self, RuleTableError> {
        sort_descending(&mut rules);

        for i in 1..rules.len() {
            let upper_min = rules[i - 1].min_price;
            if let Some(lower_max) = rules[i].max_price {
                let gap = upper_min - lower_max;
                if gap > Decimal::ZERO && gap <= MAX_CLOSABLE_GAP {
                    debug!(%lower_max, %upper_min, "Closing tier gap");
                    rules[i].max_price = Some(upper_min);
                }
            }
        }

        if let Some(bottom) = rules.last_mut() {
            if bottom.min_price > Decimal::ZERO {
                warn!(
                    min = %bottom.min_price,
                    "Lowest tier does not start at 0; extending it down"
                );
                bottom.min_price = Decimal::ZERO;
            }
        }

        Self::new(rules)
    }

    /// The tier that applies at `price`.
    ///
    /// A validated table covers every non-negative price; the lowest tier
    /// is returned for anything else.
    pub fn lookup(&self, price: Decimal) -> &AllocationRule {
        self.rules
            .iter()
            .find(|rule| rule.contains(price))
            .unwrap_or_else(|| &self.rules[self.rules.len() - 1])
    }

    /// Tiers in priority order (highest first).
    pub fn as_slice(&self) -> &[AllocationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn sort_descending(rules: &mut [AllocationRule]) {
    rules.sort_by(|a, b| b.min_price.cmp(&a.min_price));
}

fn validate(rules: &[AllocationRule]) -> Result<(), RuleTableError> {
    let top = rules.first().ok_or(RuleTableError::Empty)?;

    for (index, rule) in rules.iter().enumerate() {
        if rule.target_fraction < Decimal::ZERO || rule.target_fraction > Decimal::ONE {
            return Err(RuleTableError::TargetOutOfRange { index, target: rule.target_fraction });
        }
        if rule.min_price < Decimal::ZERO {
            return Err(RuleTableError::NegativeMin { index, min: rule.min_price });
        }
        if let Some(max) = rule.max_price {
            if max < rule.min_price {
                return Err(RuleTableError::InvertedRange { index, min: rule.min_price, max });
            }
        }
    }

    if !top.is_unbounded() {
        return Err(RuleTableError::BoundedTop { min: top.min_price });
    }

    for pair in rules.windows(2) {
        let (upper, lower) = (&pair[0], &pair[1]);
        let lower_max = lower
            .max_price
            .ok_or(RuleTableError::UnboundedBelowTop { min: lower.min_price })?;
        if lower_max < upper.min_price {
            return Err(RuleTableError::Gap { lower_max, upper_min: upper.min_price });
        }
        if lower_max > upper.min_price || lower.min_price == upper.min_price {
            return Err(RuleTableError::Overlap { lower_max, upper_min: upper.min_price });
        }
    }

    let bottom = &rules[rules.len() - 1];
    if bottom.min_price > Decimal::ZERO {
        return Err(RuleTableError::UncoveredBottom { min: bottom.min_price });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
