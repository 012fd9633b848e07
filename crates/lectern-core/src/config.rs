//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the content API location, connectivity probing, per-dataset freshness
//! limits and the offline settings (auto-sync, full content download).
//!
//! Configuration is stored at `~/.config/lectern/config.json`. The
//! `LECTERN_API_URL` environment variable overrides the stored API URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::network::probe::DEFAULT_PROBE_URL;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "lectern";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "LECTERN_API_URL";

/// Seconds between connectivity probes.
/// 30s notices a restored connection quickly without constant traffic.
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

const HOUR_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub probe_url: String,
    pub probe_interval_secs: u64,
    pub max_age: MaxAges,
    /// Sync automatically when the connection comes back.
    pub auto_sync: bool,
    /// Fetch every section's content during a full sync instead of on
    /// first view.
    pub download_all_content: bool,
    /// Also write logs to daily files under the cache directory.
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            max_age: MaxAges::default(),
            auto_sync: true,
            download_all_content: false,
            log_to_file: false,
        }
    }
}

/// How old each dataset may get before cache-first reads refresh it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxAges {
    pub chapters_secs: u64,
    pub sections_secs: u64,
    pub terms_secs: u64,
    pub quizzes_secs: u64,
}

impl Default for MaxAges {
    fn default() -> Self {
        // Textbook structure rarely changes; quizzes get tuned more often.
        Self {
            chapters_secs: 24 * HOUR_SECS,
            sections_secs: 24 * HOUR_SECS,
            terms_secs: 24 * HOUR_SECS,
            quizzes_secs: 6 * HOUR_SECS,
        }
    }
}

impl MaxAges {
    pub fn chapters(&self) -> Duration {
        Duration::from_secs(self.chapters_secs)
    }

    pub fn sections(&self) -> Duration {
        Duration::from_secs(self.sections_secs)
    }

    pub fn terms(&self) -> Duration {
        Duration::from_secs(self.terms_secs)
    }

    pub fn quizzes(&self) -> Duration {
        Duration::from_secs(self.quizzes_secs)
    }
}

impl Config {
    /// Load the stored config, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Read the config at `path`, or the defaults if there is none.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write the config to its standard location and return that path.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                debug!(url = %url, "API URL overridden from environment");
                self.api_base_url = url;
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the cache document, the database and log files.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}
