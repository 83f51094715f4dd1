//! Initialize the configuration directory: create `~/.linegpt` and a default `config.json`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and write a default `config.json` if it does not exist.
/// An existing config file is left untouched. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
