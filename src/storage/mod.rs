//! Persistence layer.
//!
//! Saves and loads the vote cooldown cache to/from a JSON file so a
//! restarted agent keeps honouring cooldowns it already started.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::agent::cache::VoteRecord;

/// Save vote records to a JSON file.
pub fn save_votes(records: &[VoteRecord], path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialise vote cache")?;

    std::fs::write(path, &json).context(format!("Failed to write vote cache to {path}"))?;

    debug!(path, entries = records.len(), "Vote cache saved");
    Ok(())
}

/// Load vote records from a JSON file.
/// Returns an empty list if the file doesn't exist (fresh start).
pub fn load_votes(path: &str) -> Result<Vec<VoteRecord>> {
    if !Path::new(path).exists() {
        info!(path, "No saved vote cache found, starting fresh");
        return Ok(Vec::new());
    }

    let json =
        std::fs::read_to_string(path).context(format!("Failed to read vote cache from {path}"))?;

    let records: Vec<VoteRecord> =
        serde_json::from_str(&json).context(format!("Failed to parse vote cache from {path}"))?;

    info!(path, entries = records.len(), "Vote cache loaded from disk");
    Ok(records)
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
