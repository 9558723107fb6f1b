//! Configuration management for Lightbox.
//!
//! Configuration is loaded from a platform-appropriate config directory
//! with sensible defaults. All config structs implement `Default`.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Lightbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings (directories)
    pub general: GeneralConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Aesthetic scoring settings
    pub scoring: ScoringConfig,

    /// Rating cache settings
    pub cache: CacheConfig,

    /// Progress monitor settings
    pub progress: ProgressConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories, falling back to
    /// ~/.lightbox/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "lightbox", "lightbox")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".lightbox").join("config.toml")
            })
    }

    /// Get the resolved source directory path (with ~ expansion).
    pub fn source_dir(&self) -> PathBuf {
        expand(&self.general.source_dir)
    }

    /// Get the resolved output root path (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        expand(&self.general.output_dir)
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Get the resolved ratings cache file path.
    ///
    /// Defaults to `<output_dir>/ratings.json` when not configured.
    pub fn ratings_file(&self) -> PathBuf {
        match &self.cache.ratings_file {
            Some(path) => expand(path),
            None => self.output_dir().join("ratings.json"),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.workers, 4);
        assert_eq!(config.processing.compressed_format, "avif");
        assert_eq!(config.progress.interval_ms, 500);
        assert_eq!(config.scoring.image_size, 224);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[processing]"));
        assert!(toml.contains("[scoring]"));
    }

    #[test]
    fn test_ratings_file_defaults_under_output() {
        let mut config = Config::default();
        config.general.output_dir = PathBuf::from("/srv/photos");
        assert_eq!(
            config.ratings_file(),
            PathBuf::from("/srv/photos/ratings.json")
        );

        config.cache.ratings_file = Some(PathBuf::from("/var/cache/ratings.json"));
        assert_eq!(
            config.ratings_file(),
            PathBuf::from("/var/cache/ratings.json")
        );
    }

    #[test]
    fn test_load_from_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.processing.workers = 8;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.processing.workers, 8);
    }
}
