//! Runtime settings
//!
//! Loaded from `~/.costroll/config.json` when present; every field has a
//! default and CLI flags may override individual values.

use crate::types::{CostrollError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_IN_FLIGHT: usize = 8;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
/// One hour
const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum concurrent external calls per request
    pub max_in_flight: usize,
    /// Timeout for one secret or plugin call
    pub fetch_timeout_secs: u64,
    /// Deadline for a whole `get_data` request
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: i64,
    /// Defaults to `~/.costroll/cache`
    pub cache_dir: Option<PathBuf>,
    /// Schema name forwarded to plugins
    pub plugin_schema: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_dir: None,
            plugin_schema: None,
        }
    }
}

impl Settings {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            CostrollError::Configuration(format!("invalid settings {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// `~/.costroll/config.json`
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().join(".costroll").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(CostrollError::Configuration(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(CostrollError::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
