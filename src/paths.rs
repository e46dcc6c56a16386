//! Where skyplan keeps its files
//!
//! Settings are read from `<config>/skyplan/config.toml`; run state and
//! the local cloud live in the state directory. The state directory is
//! picked in this order:
//!
//! 1. `--state-dir` (or `SKYPLAN_STATE_DIR`, resolved by clap)
//! 2. `state_dir` in the settings file
//! 3. the platform state dir (`~/.local/state/skyplan` on Linux), or the
//!    local data dir where the platform has no state dir

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Replaces the whole config directory, mainly for tests and CI
pub const ENV_CONFIG_DIR: &str = "SKYPLAN_CONFIG_DIR";

const APP_DIR: &str = "skyplan";

/// Directory holding `config.toml`
pub fn config_dir() -> Result<PathBuf> {
    config_dir_from(std::env::var(ENV_CONFIG_DIR).ok().as_deref())
}

fn config_dir_from(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        let path = expand(dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }
    let base = dirs::config_dir().context("Could not determine the config directory")?;
    Ok(base.join(APP_DIR))
}

/// Resolve the state directory from the flag, then settings, then default
pub fn state_dir(flag: Option<&Path>, configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        let path = dir.to_str().map_or_else(|| dir.to_path_buf(), expand);
        log::debug!("Using state dir from --state-dir: {}", path.display());
        return Ok(path);
    }
    if let Some(dir) = configured {
        let path = expand(dir);
        log::debug!("Using state dir from settings: {}", path.display());
        return Ok(path);
    }
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .context("Could not determine the state directory")?;
    Ok(base.join(APP_DIR))
}

/// Expand `~` and environment variables; unknown variables are kept as is
fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
