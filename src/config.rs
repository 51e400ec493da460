//! Library configuration management.
//!
//! This module handles loading and saving the authkeep configuration,
//! which includes the identity provider base URL and the token refresh
//! timing parameters.
//!
//! Configuration is stored at `~/.config/authkeep/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "authkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default identity provider base URL.
/// The auth backend serves its API under this prefix on port 8002.
const DEFAULT_BASE_URL: &str = "http://localhost:8002/api-auth/v1";

/// HTTP request timeout in seconds.
/// 5s fails fast so a background refresh never hangs past the next tick.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Period of the background refresh check in seconds.
/// 30s keeps the worst-case staleness well inside the refresh margin.
const DEFAULT_REFRESH_PERIOD_SECS: u64 = 30;

/// Buffer before token expiry during which a proactive refresh is attempted.
/// 3 minutes leaves room for several retry ticks if the provider is slow.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 180;

/// Group claim that elevates an authenticated session to admin.
const DEFAULT_ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_period_secs: u64,
    pub refresh_margin_secs: i64,
    pub admin_group: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_period_secs: DEFAULT_REFRESH_PERIOD_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            admin_group: DEFAULT_ADMIN_GROUP.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_margin_secs)
    }
}
