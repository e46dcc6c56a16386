use anyhow::{Context, Result, bail};
use declarative::{ExecuteOptions, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::paths;

/// File name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Settings
// ============================================================================

/// User settings from `~/.config/skyplan/config.toml`
///
/// Every field is optional; CLI flags and environment variables win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default worker count for apply and destroy
    pub jobs: Option<usize>,

    /// Retry policy for provider calls
    pub retry: RetryConfig,

    /// Where state and the local cloud live
    pub state_dir: Option<String>,
}

impl Settings {
    /// Load settings from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in settings file: {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == Some(0) {
            bail!("jobs must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            bail!("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        Ok(())
    }

    /// Executor options, with `--jobs` taking precedence
    pub fn execute_options(&self, jobs: Option<usize>) -> ExecuteOptions {
        ExecuteOptions {
            jobs: jobs.or(self.jobs).unwrap_or(1).max(1),
            retry: self.retry.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
