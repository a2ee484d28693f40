pub mod config;
pub mod plan;
pub mod zones;

use std::path::{Path, PathBuf};
use tracing::debug;
use zoneplan_core::Config;

/// Resolve the configuration file: `--config`, then `$ZONEPLAN_CONFIG`, then the default location.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::path()?),
    }
}

pub fn load_config(explicit: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = config_path(explicit)?;
    debug!(path = %path.display(), exists = path.exists(), "loading configuration");
    Ok(Config::load_from(&path)?)
}
