//! Persistence layer.
//!
//! Saves and loads portfolio state to/from a JSON file, and exports or
//! imports the same document for moving data between machines. The JSON
//! shape is `PersistedState`; the ledger is rebuilt from it on load.

pub mod export;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::portfolio::PortfolioState;
use crate::types::CycleRecord;

pub use export::{default_export_file_name, export_state, import_state, parse_import, ImportError};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "portfolio_state.json";

/// On-disk representation of `PortfolioState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub volatile_qty_text: String,
    pub stable_qty_text: String,
    #[serde(default)]
    pub cycle_history: Vec<CycleRecord>,
    #[serde(alias = "currentCycle")]
    pub next_cycle_number: u64,
}

/// Save portfolio state to a JSON file.
pub fn save_state(state: &PortfolioState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(&state.to_persisted())
        .context("Failed to serialise portfolio state")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write state to {path}"))?;

    debug!(path, cycles = state.ledger().len(), "State saved");
    Ok(())
}

/// Load portfolio state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<PortfolioState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let persisted: PersistedState = serde_json::from_str(&json)
        .context(format!("Failed to parse state from {path}"))?;

    let state = PortfolioState::from_persisted(persisted)
        .context(format!("Saved state in {path} is inconsistent"))?;

    info!(
        path,
        cycles = state.ledger().len(),
        next_cycle = state.ledger().next_cycle_number(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
