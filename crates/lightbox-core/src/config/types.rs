//! Sub-configuration structs with defaults matching the deployed layout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory of source photographs (one flat directory, JPEGs)
    pub source_dir: PathBuf,

    /// Root of the derived artifact layout (original/ and compressed/)
    pub output_dir: PathBuf,

    /// Directory where ONNX models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("~/Pictures/lumix-export"),
            output_dir: PathBuf::from("~/.lightbox/library"),
            model_dir: PathBuf::from("~/.lightbox/models"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of simultaneously in-flight items per pass
    pub workers: usize,

    /// Encoding format of the display variant ("avif", "webp", "jpg")
    pub compressed_format: String,

    /// Name or path of the exiftool binary
    pub exiftool_bin: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            compressed_format: "avif".to_string(),
            exiftool_bin: "exiftool".to_string(),
        }
    }
}

/// Aesthetic scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Model name (loaded from `<model>.onnx` under model_dir)
    pub model: String,

    /// Model input size in pixels (square)
    pub image_size: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: "paq2piq".to_string(),
            image_size: 224,
        }
    }
}

/// Rating cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Path of the ratings JSON file.
    /// Defaults to `<output_dir>/ratings.json` when unset.
    pub ratings_file: Option<PathBuf>,
}

/// Progress monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Sampling interval in milliseconds
    pub interval_ms: u64,

    /// Sliding window for the instantaneous rate, in seconds
    pub window_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            window_secs: 5,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
