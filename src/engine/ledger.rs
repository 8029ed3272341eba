//! Cycle ledger: append-only history of deposits, buys and sells.
//!
//! Each append records the portfolio total at the given snapshot and the
//! profit since the previous cycle. Cycle numbers are dense and 1-based.
//! Appends are all-or-nothing: every check runs before anything is pushed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::strategy::allocation;
use crate::types::{CycleKind, CycleRecord, PortfolioSnapshot, RebalanceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLedger {
    records: Vec<CycleRecord>,
    next_cycle_number: u64,
}

impl Default for CycleLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleLedger {
    /// A fresh, empty ledger.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_cycle_number: 1,
        }
    }

    /// Rebuild a ledger from persisted fields.
    ///
    /// Fails with `InvalidState` if the records break any ledger invariant:
    /// dense 1-based numbering, deposit first and only first, profit absent
    /// on the deposit and equal to the change in total on every later cycle,
    /// and `next_cycle_number == len + 1`.
    pub fn restore(
        records: Vec<CycleRecord>,
        next_cycle_number: u64,
    ) -> Result<Self, RebalanceError> {
        for (i, record) in records.iter().enumerate() {
            let expected = i as u64 + 1;
            if record.cycle_number != expected {
                return Err(RebalanceError::InvalidState(format!(
                    "record {i} has cycle number {}, expected {expected}",
                    record.cycle_number
                )));
            }
            match record.kind {
                CycleKind::Deposit if i > 0 => {
                    return Err(RebalanceError::InvalidState(format!(
                        "cycle {expected} is a deposit; only the first cycle may be"
                    )))
                }
                kind if i == 0 && kind != CycleKind::Deposit => {
                    return Err(RebalanceError::InvalidState(format!(
                        "first cycle must be a deposit, found {kind}"
                    )))
                }
                _ => {}
            }
            let expected_profit = match i {
                0 => None,
                _ => Some(record.total_value_at_cycle - records[i - 1].total_value_at_cycle),
            };
            if record.profit_since_previous != expected_profit {
                return Err(RebalanceError::InvalidState(format!(
                    "cycle {expected} records profit {:?}, expected {:?}",
                    record.profit_since_previous, expected_profit
                )));
            }
        }

        let expected_next = records.len() as u64 + 1;
        if next_cycle_number != expected_next {
            return Err(RebalanceError::InvalidState(format!(
                "next cycle number is {next_cycle_number}, expected {expected_next}"
            )));
        }

        Ok(Self { records, next_cycle_number })
    }

    /// Open the ledger with the initial deposit. Only valid when empty.
    pub fn append_deposit(
        &mut self,
        snapshot: &PortfolioSnapshot,
    ) -> Result<CycleRecord, RebalanceError> {
        self.append_deposit_at(snapshot, Utc::now())
    }

    /// As [`append_deposit`](Self::append_deposit) with an explicit timestamp.
    pub fn append_deposit_at(
        &mut self,
        snapshot: &PortfolioSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<CycleRecord, RebalanceError> {
        if !self.records.is_empty() {
            return Err(RebalanceError::InvalidState(format!(
                "ledger already has {} cycle(s); a deposit can only open it",
                self.records.len()
            )));
        }
        let total = allocation::total_value(snapshot)?;

        let record = self.build(snapshot, CycleKind::Deposit, total, None, timestamp);
        Ok(self.push(record))
    }

    /// Record a buy or sell after the deposit.
    pub fn append_movement(
        &mut self,
        snapshot: &PortfolioSnapshot,
        kind: CycleKind,
    ) -> Result<CycleRecord, RebalanceError> {
        self.append_movement_at(snapshot, kind, Utc::now())
    }

    /// As [`append_movement`](Self::append_movement) with an explicit timestamp.
    pub fn append_movement_at(
        &mut self,
        snapshot: &PortfolioSnapshot,
        kind: CycleKind,
        timestamp: DateTime<Utc>,
    ) -> Result<CycleRecord, RebalanceError> {
        if kind == CycleKind::Deposit {
            return Err(RebalanceError::InvalidInput(
                "a movement must be BUY or SELL".to_string(),
            ));
        }
        let previous_total = self
            .records
            .last()
            .map(|r| r.total_value_at_cycle)
            .ok_or_else(|| {
                RebalanceError::InvalidState(
                    "no deposit recorded yet; register the initial deposit first".to_string(),
                )
            })?;
        let total = allocation::total_value(snapshot)?;
        let profit = total - previous_total;

        let record = self.build(snapshot, kind, total, Some(profit), timestamp);
        Ok(self.push(record))
    }

    /// Clear every record and restart numbering at 1.
    pub fn reset(&mut self) {
        let cleared = self.records.len();
        self.records.clear();
        self.next_cycle_number = 1;
        info!(cleared, "Cycle ledger reset");
    }

    /// Read-only view of the recorded cycles, oldest first.
    pub fn snapshot(&self) -> &[CycleRecord] {
        &self.records
    }

    pub fn next_cycle_number(&self) -> u64 {
        self.next_cycle_number
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&CycleRecord> {
        self.records.last()
    }

    /// Change in total value since the opening deposit (zero when empty).
    pub fn cumulative_profit(&self) -> Decimal {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => last.total_value_at_cycle - first.total_value_at_cycle,
            _ => Decimal::ZERO,
        }
    }

    fn build(
        &self,
        snapshot: &PortfolioSnapshot,
        kind: CycleKind,
        total: Decimal,
        profit: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> CycleRecord {
        CycleRecord {
            cycle_number: self.next_cycle_number,
            total_value_at_cycle: total,
            kind,
            timestamp,
            price_at_cycle: snapshot.price,
            profit_since_previous: profit,
            volatile_qty_at_cycle: snapshot.volatile_qty,
            stable_qty_at_cycle: snapshot.stable_qty,
        }
    }

    fn push(&mut self, record: CycleRecord) -> CycleRecord {
        self.records.push(record.clone());
        self.next_cycle_number += 1;

        info!(
            cycle = record.cycle_number,
            kind = %record.kind,
            total = %record.total_value_at_cycle,
            profit = ?record.profit_since_previous,
            "Cycle recorded"
        );
        record
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
