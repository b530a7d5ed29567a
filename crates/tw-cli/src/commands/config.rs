//! Config file handling

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_info, print_success, print_warning};
use tw_core::config::{self, WatchdogConfig};
use tw_core::error::ConfigError;

fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Load the config, falling back to defaults when the file does not exist
pub fn load_or_default(path: Option<&Path>) -> Result<WatchdogConfig> {
    let path = config_path(path);
    match config::load_config(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::warn!("Config file {:?} not found, using defaults", path);
            Ok(WatchdogConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", path)),
    }
}

/// Write a default config file
pub fn config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path(path);

    if path.exists() && !force {
        print_warning(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &WatchdogConfig::default())
        .with_context(|| format!("Failed to write config to {:?}", path))?;

    print_success(&format!("Wrote default config to {:?}", path));
    print_info("Set workspace_url before running 'tunnel-watchdog watch'");
    Ok(())
}
