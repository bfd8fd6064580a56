use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

/// Tunable durations and endpoints. The defaults mirror the values the
/// detection paths were originally shipped with; none of them carry semantic
/// weight beyond "long enough for the host page to settle".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Wait after a navigation signal before re-reading page state.
    pub settle_delay_ms: u64,
    /// Fallback poll period for detections missed by navigation events.
    pub poll_interval_ms: u64,
    /// Delay before the first fallback poll after the observer starts.
    pub initial_poll_delay_ms: u64,
    /// Duration of the stubbed processing operation.
    pub process_simulated_ms: u64,
    pub backend_url: String,
    pub request_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            poll_interval_ms: 5000,
            initial_poll_delay_ms: 2000,
            process_simulated_ms: 2000,
            backend_url: "http://localhost:5000".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl Settings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_poll_delay(&self) -> Duration {
        Duration::from_millis(self.initial_poll_delay_ms)
    }

    pub fn process_simulated(&self) -> Duration {
        Duration::from_millis(self.process_simulated_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Fast variant used by tests and local experiments.
    pub fn fast() -> Self {
        Self {
            settle_delay_ms: 10,
            poll_interval_ms: 50,
            initial_poll_delay_ms: 20,
            process_simulated_ms: 50,
            ..Self::default()
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> Settings {
        self.data.read().expect("settings lock poisoned").clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.data.write().expect("settings lock poisoned");
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
