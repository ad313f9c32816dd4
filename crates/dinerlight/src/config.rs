use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LightingError, LightingResult};
use crate::types::RestaurantId;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_RESTAURANT_ID: RestaurantId = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const API_URL_ENV: &str = "DINERLIGHT_API_URL";
pub const RESTAURANT_ID_ENV: &str = "DINERLIGHT_RESTAURANT_ID";
pub const TIMEOUT_ENV: &str = "DINERLIGHT_TIMEOUT_SECS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_base_url: String,
    pub restaurant_id: RestaurantId,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            restaurant_id: DEFAULT_RESTAURANT_ID,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/dinerlight/config.json`
    pub fn default_path() -> LightingResult<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| {
            LightingError::Config("Unable to determine config directory".to_string())
        })?;
        Ok(base.join("dinerlight").join("config.json"))
    }

    /// Config file (if any) at the default path, then environment overrides.
    pub fn load() -> LightingResult<Self> {
        let config = Self::load_from(&Self::default_path()?)?;
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> LightingResult<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|err| {
            LightingError::Config(format!("Failed to read {}: {}", path.display(), err))
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            LightingError::Config(format!("Failed to parse {}: {}", path.display(), err))
        })
    }

    pub fn save_to(&self, path: &Path) -> LightingResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                LightingError::Config(format!("Failed to create {}: {}", parent.display(), err))
            })?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| LightingError::Config(format!("Failed to encode config: {}", err)))?;
        fs::write(path, bytes).map_err(|err| {
            LightingError::Config(format!("Failed to write {}: {}", path.display(), err))
        })
    }

    /// Applies `DINERLIGHT_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> LightingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(RESTAURANT_ID_ENV) {
            self.restaurant_id = raw.trim().parse().map_err(|_| {
                LightingError::Config(format!(
                    "{} must be an integer, got '{}'",
                    RESTAURANT_ID_ENV, raw
                ))
            })?;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            self.timeout_secs = raw.trim().parse().map_err(|_| {
                LightingError::Config(format!(
                    "{} must be a number of seconds, got '{}'",
                    TIMEOUT_ENV, raw
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects settings the client cannot run with.
    pub fn validate(&self) -> LightingResult<()> {
        if self.timeout_secs == 0 {
            return Err(LightingError::Config(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
