use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which engine drives the trace. A taint-only engine produces no
/// predicates, so branch records are only appended in symbolic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Symbolic,
    Taint,
}

/// Tunable limits of a trace session, persistable as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub instruction_limit: Option<u64>, // instructions per window, None for no ceiling
    pub time_limit_secs: Option<u64>,   // wall-clock budget for the whole run
    pub engine_mode: EngineMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            instruction_limit: Some(10_000),
            time_limit_secs: Some(60),
            engine_mode: EngineMode::Symbolic,
        }
    }
}

impl SessionOptions {
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read session options from {}", path.display()))?;
        let options = serde_json::from_str(&text)
            .with_context(|| format!("malformed session options in {}", path.display()))?;
        Ok(options)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("cannot encode session options")?;
        fs::write(path, text)
            .with_context(|| format!("cannot write session options to {}", path.display()))?;
        Ok(())
    }
}
