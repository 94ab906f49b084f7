use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }
}
