use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections and fields fall back
    /// to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| PulseError::Config(format!("{}: {err}", path.display())))
    }
}

/// Where the monitor connects in streaming mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
        }
    }
}

/// Settings for the bundled heart-rate feed simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub bind: String,
    pub interval_ms: u64,
}

impl SimulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            interval_ms: 5_000,
        }
    }
}
