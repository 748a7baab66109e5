//! YAML configuration file: tracker base URL and API key.
//!
//! The core never reads files; the CLI loads this once and hands the
//! values to the HTTP client.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
    pub api_key: String,
}

impl Config {
    /// Base URL with any trailing slash removed, ready for joining.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    if config.url.trim().is_empty() {
        anyhow::bail!("config file {}: 'url' must not be empty", path.display());
    }
    if config.api_key.trim().is_empty() {
        anyhow::bail!("config file {}: 'api_key' must not be empty", path.display());
    }
    Ok(config)
}
