//! Configuration loading for the `fetchbot` binary.
//!
//! The config file is TOML with the same shape as
//! [`RobotConfig`](fetchbot_types::RobotConfig); every section and field is
//! optional and falls back to the built-in chassis defaults. A missing file
//! is not an error, a malformed one is.

use std::fs;
use std::path::Path;

use fetchbot_types::{RobotConfig, RobotError};
use tracing::info;

/// Default config location, relative to the working directory.
pub const DEFAULT_PATH: &str = "fetchbot.toml";

/// Load the config from `path`, or the defaults when the file is absent.
pub fn load(path: &Path) -> Result<RobotConfig, RobotError> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(RobotConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RobotError::Config(format!("read {}: {e}", path.display())))?;
    let cfg: RobotConfig = toml::from_str(&raw)
        .map_err(|e| RobotError::Config(format!("parse {}: {e}", path.display())))?;
    info!(path = %path.display(), "config loaded");
    Ok(cfg)
}
