//! Core engine: cycle ledger, portfolio state, and the price watcher.

pub mod ledger;
pub mod portfolio;
pub mod watcher;
