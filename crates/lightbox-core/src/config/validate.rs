//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.workers must be > 0".into(),
            ));
        }
        if !matches!(
            self.processing.compressed_format.as_str(),
            "avif" | "webp" | "jpg" | "jpeg"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "processing.compressed_format must be one of avif, webp, jpg (got {:?})",
                self.processing.compressed_format
            )));
        }
        if self.processing.exiftool_bin.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.exiftool_bin must not be empty".into(),
            ));
        }
        if self.scoring.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "scoring.image_size must be > 0".into(),
            ));
        }
        if self.progress.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "progress.interval_ms must be > 0".into(),
            ));
        }
        if self.progress.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "progress.window_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}
