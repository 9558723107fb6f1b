//! Error types for the Lightbox ingestion pipeline.
//!
//! Errors are split along the pipeline's failure taxonomy: fatal conditions
//! surface as ordinary `Err` values that abort the run, while per-item
//! failures travel inside [`Outcome::Recoverable`] so one bad file never
//! takes the batch down with it.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Lightbox operations.
#[derive(Error, Debug)]
pub enum LightboxError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline stage errors
    #[error("Pipeline error: {0}")]
    Stage(#[from] StageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline stage errors, organized by stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Source directory is absent (fatal for a from-source run)
    #[error("Source directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Artifact encoding or publishing failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Date-tag audit failed
    #[error("Audit error for {path}: {message}")]
    Audit { path: PathBuf, message: String },

    /// The batched metadata copy failed part-way through
    #[error("Metadata propagation failed: {message}")]
    Propagate { message: String },

    /// The scoring backend could not be initialized (fatal)
    #[error("Scoring backend failed to initialize: {message}")]
    ScorerInit { message: String },

    /// Scoring a single image failed (recoverable, retried)
    #[error("Scoring error for {path}: {message}")]
    Score { path: PathBuf, message: String },

    /// The ratings cache could not be written
    #[error("Cache error for {path}: {message}")]
    Cache { path: PathBuf, message: String },
}

/// Result of one worker operation on one item.
///
/// Workers never abort the batch: anything short of a fatal condition is
/// returned as `Recoverable` and the orchestrator decides centrally what
/// to do with it (log, retry, or assign a fallback value).
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Recoverable(StageError),
}

impl<T> Outcome<T> {
    /// True if this outcome carries a value.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<T, StageError> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Recoverable(e) => Err(e),
        }
    }
}

impl<T> From<std::result::Result<T, StageError>> for Outcome<T> {
    fn from(res: std::result::Result<T, StageError>) -> Self {
        match res {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Recoverable(e),
        }
    }
}

/// Convenience type alias for Lightbox results.
pub type Result<T> = std::result::Result<T, LightboxError>;

/// Convenience type alias for stage-specific results.
pub type StageResult<T> = std::result::Result<T, StageError>;
