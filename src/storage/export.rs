//! Export and import of the full portfolio document.
//!
//! The exported file is the same JSON as the state file, so a file written
//! on one machine can be imported on another. Import checks the shape of
//! the document before deserializing it and then rebuilds the ledger; the
//! caller's current state is only replaced when every step succeeded.

use chrono::NaiveDate;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use super::PersistedState;
use crate::engine::portfolio::PortfolioState;
use crate::types::RebalanceError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read import file: {0}")]
    Io(#[from] std::io::Error),

    #[error("import file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("import file has the wrong shape: {0}")]
    Malformed(String),

    #[error("imported history is inconsistent: {0}")]
    Ledger(#[from] RebalanceError),
}

/// `portfolio-YYYY-MM-DD.json`
pub fn default_export_file_name(date: NaiveDate) -> String {
    format!("portfolio-{}.json", date.format("%Y-%m-%d"))
}

/// Write the state as pretty-printed JSON to `path`.
pub fn export_state(state: &PortfolioState, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    let json = serde_json::to_string_pretty(&state.to_persisted())
        .context("Failed to serialise portfolio for export")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write export to {}", path.display()))?;

    info!(path = %path.display(), cycles = state.ledger().len(), "Portfolio exported");
    Ok(())
}

/// Read and validate an exported document.
pub fn import_state(path: &Path) -> Result<PortfolioState, ImportError> {
    let text = std::fs::read_to_string(path)?;
    match parse_import(&text) {
        Ok(state) => {
            info!(path = %path.display(), cycles = state.ledger().len(), "Portfolio imported");
            Ok(state)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Import rejected");
            Err(e)
        }
    }
}

/// Validate and rebuild a portfolio from exported JSON text.
pub fn parse_import(text: &str) -> Result<PortfolioState, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    check_shape(&value)?;

    let persisted: PersistedState = serde_json::from_value(value)?;
    Ok(PortfolioState::from_persisted(persisted)?)
}

fn check_shape(value: &Value) -> Result<(), ImportError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ImportError::Malformed("top level must be an object".into()))?;

    for field in ["volatileQtyText", "stableQtyText"] {
        match obj.get(field) {
            Some(Value::String(_)) => {}
            Some(_) => return Err(ImportError::Malformed(format!("{field} must be a string"))),
            None => return Err(ImportError::Malformed(format!("missing {field}"))),
        }
    }

    match obj.get("cycleHistory") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(ImportError::Malformed("cycleHistory must be an array".into())),
        None => return Err(ImportError::Malformed("missing cycleHistory".into())),
    }

    let counter = obj.get("nextCycleNumber").or_else(|| obj.get("currentCycle"));
    match counter {
        Some(n) if n.as_u64().is_some() => Ok(()),
        Some(_) => Err(ImportError::Malformed(
            "nextCycleNumber must be a non-negative integer".into(),
        )),
        None => Err(ImportError::Malformed("missing nextCycleNumber".into())),
    }
}
