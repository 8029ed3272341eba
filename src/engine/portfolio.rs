//! Portfolio state: the single owner of everything the user has entered.
//!
//! Holds the quantity texts exactly as typed plus the cycle ledger. The
//! driver passes it into the engine and the ledger and converts it to and
//! from `PersistedState` at the storage boundary; there is no other copy.

use rust_decimal::Decimal;

use crate::engine::ledger::CycleLedger;
use crate::storage::PersistedState;
use crate::strategy::AllocationEngine;
use crate::types::{
    parse_quantity, AllocationResult, CycleKind, CycleRecord, PortfolioSnapshot, RebalanceError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfolioState {
    volatile_qty_text: String,
    stable_qty_text: String,
    ledger: CycleLedger,
}

impl PortfolioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entered quantities. Texts are kept verbatim; they are
    /// parsed when a snapshot is taken.
    pub fn set_quantities(&mut self, volatile: impl Into<String>, stable: impl Into<String>) {
        self.volatile_qty_text = volatile.into();
        self.stable_qty_text = stable.into();
    }

    /// Replace the quantities with user-entered text, rejecting anything
    /// that is not a non-negative amount. The state is unchanged on error.
    pub fn enter_quantities(
        &mut self,
        volatile: impl Into<String>,
        stable: impl Into<String>,
    ) -> Result<(), RebalanceError> {
        let (volatile, stable) = (volatile.into(), stable.into());
        parse_quantity(&volatile, "volatile quantity")?;
        parse_quantity(&stable, "stable quantity")?;
        self.set_quantities(volatile, stable);
        Ok(())
    }

    pub fn volatile_qty_text(&self) -> &str {
        &self.volatile_qty_text
    }

    pub fn stable_qty_text(&self) -> &str {
        &self.stable_qty_text
    }

    pub fn ledger(&self) -> &CycleLedger {
        &self.ledger
    }

    /// Snapshot of the entered quantities at `price`.
    pub fn snapshot(&self, price: Decimal) -> Result<PortfolioSnapshot, RebalanceError> {
        PortfolioSnapshot::from_text(&self.volatile_qty_text, &self.stable_qty_text, price)
    }

    /// Take a snapshot at `price` and evaluate it. Returns the snapshot too,
    /// so a cycle recorded from this recommendation uses the same inputs.
    pub fn recommend(
        &self,
        engine: &AllocationEngine,
        price: Decimal,
    ) -> Result<(PortfolioSnapshot, AllocationResult), RebalanceError> {
        let snapshot = self.snapshot(price)?;
        let result = engine.evaluate(&snapshot)?;
        Ok((snapshot, result))
    }

    pub fn record_deposit(
        &mut self,
        snapshot: &PortfolioSnapshot,
    ) -> Result<CycleRecord, RebalanceError> {
        self.ledger.append_deposit(snapshot)
    }

    pub fn record_movement(
        &mut self,
        snapshot: &PortfolioSnapshot,
        kind: CycleKind,
    ) -> Result<CycleRecord, RebalanceError> {
        self.ledger.append_movement(snapshot, kind)
    }

    /// Clear the history and the entered quantities.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.volatile_qty_text.clear();
        self.stable_qty_text.clear();
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            volatile_qty_text: self.volatile_qty_text.clone(),
            stable_qty_text: self.stable_qty_text.clone(),
            cycle_history: self.ledger.snapshot().to_vec(),
            next_cycle_number: self.ledger.next_cycle_number(),
        }
    }

    /// Rehydrate from persisted fields; the ledger invariants are checked.
    pub fn from_persisted(persisted: PersistedState) -> Result<Self, RebalanceError> {
        let ledger = CycleLedger::restore(persisted.cycle_history, persisted.next_cycle_number)?;
        Ok(Self {
            volatile_qty_text: persisted.volatile_qty_text,
            stable_qty_text: persisted.stable_qty_text,
            ledger,
        })
    }
}
