// ⚙️ Tracker configuration
//
// JSON file, every field optional. A missing file means defaults.
// ALLOWANCE_TRACKER_DB overrides the ledger path.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::OrphanPolicy;
use crate::sensor::DEFAULT_UNIT;

pub const DB_PATH_ENV: &str = "ALLOWANCE_TRACKER_DB";
pub const DEFAULT_DB_PATH: &str = "allowance_tracker.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Ledger file location
    pub db_path: PathBuf,

    /// Tracked person ids. Empty means "recover from the ledger".
    pub roster: Vec<String>,

    pub orphan_policy: OrphanPolicy,

    /// Label shown next to balances
    pub unit_of_measurement: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            roster: Vec::new(),
            orphan_policy: OrphanPolicy::default(),
            unit_of_measurement: DEFAULT_UNIT.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Read `path` (defaults if absent), then apply the environment override
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Self::from_json(&data)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };

        Ok(config.with_db_override(std::env::var(DB_PATH_ENV).ok()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn with_db_override(mut self, db_path: Option<String>) -> Self {
        if let Some(path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.db_path = PathBuf::from(path);
        }
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}
