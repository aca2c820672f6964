//! Configuration management for the review loop.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. The `reviewLoop` object in `.claude/settings.json`
//! 3. Environment variables (`DIFFER_URL`, `PR_REVIEW_LOOP_DISABLED`,
//!    `PR_REVIEW_LOOP_HISTORY`)
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "reviewLoop": {
//!     "serviceUrl": "http://localhost:8576",
//!     "pollIntervalSecs": 60,
//!     "maxIdleSecs": 43200,
//!     "maxRepeatedBlocks": 3
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ReviewLoopError};

/// Environment variable holding the review service base URL.
pub const SERVICE_URL_ENV: &str = "DIFFER_URL";

/// Environment variable that disables the hook entirely.
pub const DISABLED_ENV: &str = "PR_REVIEW_LOOP_DISABLED";

/// Environment variable overriding the escalation history location.
pub const HISTORY_FILE_ENV: &str = "PR_REVIEW_LOOP_HISTORY";

/// Default review service base URL.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8576";

/// Default escalation history location, shared by every invocation on the host.
pub const DEFAULT_HISTORY_FILE: &str = "/tmp/pr_review_loop_block_history";

/// Review loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Base URL of the review session service.
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Seconds between poll ticks (default: 60).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds of polling without actionable feedback before giving up (default: 12h).
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Identical consecutive blocks tolerated before forcing an allow (default: 3).
    #[serde(default = "default_max_repeated_blocks")]
    pub max_repeated_blocks: usize,

    /// Where the escalation history is persisted.
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Time budget for `git fetch` during the conflict probe.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Time budget for each review service request.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Skip every check and always allow the agent to stop.
    #[serde(default)]
    pub disabled: bool,
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_idle_secs() -> u64 {
    12 * 60 * 60
}

fn default_max_repeated_blocks() -> usize {
    3
}

fn default_history_file() -> PathBuf {
    PathBuf::from(DEFAULT_HISTORY_FILE)
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            poll_interval_secs: default_poll_interval_secs(),
            max_idle_secs: default_max_idle_secs(),
            max_repeated_blocks: default_max_repeated_blocks(),
            history_file: default_history_file(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            disabled: false,
        }
    }
}

/// The slice of `.claude/settings.json` this crate reads.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default, rename = "reviewLoop")]
    review_loop: Option<LoopConfig>,
}

impl LoopConfig {
    /// Load configuration for a project, applying environment overrides.
    ///
    /// A missing settings file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(project_dir)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load only the settings file layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read or parsed.
    pub fn load_file(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&settings_path)?;
        let settings: SettingsFile = serde_json::from_str(&content).map_err(|e| {
            ReviewLoopError::config_with_path(e.to_string(), settings_path.clone())
        })?;

        debug!("Loaded settings from {}", settings_path.display());
        Ok(settings.review_loop.unwrap_or_default())
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(SERVICE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.service_url = url;
        }
        if let Some(flag) = lookup(DISABLED_ENV) {
            if is_truthy(&flag) {
                self.disabled = true;
            }
        }
        if let Some(path) = lookup(HISTORY_FILE_ENV).filter(|v| !v.trim().is_empty()) {
            self.history_file = PathBuf::from(path);
        }
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".claude/settings.json")
    }

    /// Check the configuration for values the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service_url)
            .map_err(|e| ReviewLoopError::invalid_config("serviceUrl", e.to_string()))?;

        if self.poll_interval_secs == 0 {
            return Err(ReviewLoopError::invalid_config(
                "pollIntervalSecs",
                "must be greater than zero",
            ));
        }
        if self.max_repeated_blocks == 0 {
            return Err(ReviewLoopError::invalid_config(
                "maxRepeatedBlocks",
                "must be greater than zero",
            ));
        }
        if self.fetch_timeout_secs == 0 || self.http_timeout_secs == 0 {
            return Err(ReviewLoopError::invalid_config(
                "timeouts",
                "fetchTimeoutSecs and httpTimeoutSecs must be greater than zero",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// `1`, `true` and `yes` (any case) switch a flag on.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
