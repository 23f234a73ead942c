// Configuration management
// Persistent defaults for capture location and body limits, with env overrides

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::json_utils::DEFAULT_PREVIEW_DEPTH;
use crate::query::QuerySettings;

pub const ENV_CAPTURE_DIR: &str = "FLOWPROBE_CAPTURE_DIR";
pub const ENV_MAX_CONTENT_SIZE: &str = "FLOWPROBE_MAX_CONTENT_SIZE";

/// flowprobe configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding capture files, one per session
    pub capture_dir: PathBuf,
    /// Session used when a query does not name one
    pub default_session: String,
    /// Bodies larger than this (bytes) are previewed or truncated
    pub max_content_size: usize,
    /// Depth of structure previews for oversized JSON bodies
    pub preview_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("."),
            default_session: "capture.har".to_string(),
            max_content_size: 9_999_999,
            preview_depth: DEFAULT_PREVIEW_DEPTH,
        }
    }
}

impl Config {
    /// Load the user config file (defaults when absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_file_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CAPTURE_DIR).filter(|d| !d.is_empty()) {
            self.capture_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup(ENV_MAX_CONTENT_SIZE) {
            self.max_content_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a byte count, got '{}'", ENV_MAX_CONTENT_SIZE, size))?;
        }
        Ok(())
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Get the config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|dir| dir.join("flowprobe").join("config.json"))
            .ok_or_else(|| anyhow!("Could not determine config directory or home directory"))
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            max_content_size: self.max_content_size,
            preview_depth: self.preview_depth,
            default_session: self.default_session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_content_size, 9_999_999);
    }

    #[test]
    fn test_save_and_partial_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            capture_dir: PathBuf::from("/data/captures"),
            max_content_size: 4096,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        fs::write(&path, r#"{"preview_depth": 4}"#).unwrap();
        let partial = Config::load_from(&path).unwrap();
        assert_eq!(partial.preview_depth, 4);
        assert_eq!(partial.default_session, "capture.har");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|key| match key {
                ENV_CAPTURE_DIR => Some("/tmp/flows".to_string()),
                ENV_MAX_CONTENT_SIZE => Some(" 2048 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.capture_dir, PathBuf::from("/tmp/flows"));
        assert_eq!(config.max_content_size, 2048);

        let err = config
            .apply_env(|key| (key == ENV_MAX_CONTENT_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_query_settings() {
        let settings = Config::default().query_settings();
        assert_eq!(settings.preview_depth, 2);
        assert_eq!(settings.default_session, "capture.har");
    }
}
