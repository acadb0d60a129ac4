use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hreg_types::EventType;

use crate::error::{EventError, EventResult};

/// Configuration for the event system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one JSON file per event. `None` leaves the engine
    /// unconfigured: every processing call fails until it is set.
    pub data_dir: Option<PathBuf>,
    /// Event types the engine accepts.
    pub supported_types: Vec<EventType>,
    /// Reject unsigned events instead of accepting them with a warning.
    pub require_signatures: bool,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            supported_types: EventType::registry_types(),
            require_signatures: false,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration storing events under `dir`.
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> EventResult<Self> {
        toml::from_str(s).map_err(|e| EventError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> EventResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EventError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn supports(&self, event_type: &EventType) -> bool {
        self.supported_types.contains(event_type)
    }
}

/// Bounds for events waiting in the retry set.
///
/// An entry that exceeds either bound is moved to the dead-letter list.
/// `None` disables that bound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub max_age_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(64),
            max_age_secs: None,
        }
    }
}

impl RetryConfig {
    /// Keep deferred events forever.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_age_secs: None,
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}
