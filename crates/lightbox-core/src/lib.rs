//! Lightbox Core - photo ingestion and enrichment library.
//!
//! Lightbox turns a flat directory of camera JPEGs into a ready-to-serve
//! gallery: an archival copy and a compressed display crop per photo,
//! audited capture metadata, and a cached aesthetic rating.
//!
//! # Architecture
//!
//! ```text
//! Scan → Derive (crop + encode) → Audit/Propagate (exiftool) → Score → Records
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lightbox_core::{Config, Pipeline, RunIntent};
//!
//! #[tokio::main]
//! async fn main() -> lightbox_core::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = Pipeline::new(config);
//!
//!     let intent = RunIntent { reprocess: true, rescan_ratings: false };
//!     let summary = pipeline.run(&intent).await?;
//!     println!("{} photos ready", summary.photos.len());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod cache;
pub mod config;
pub mod error;
pub mod exiftool;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scoring;
pub mod types;

// Re-exports for convenient access
pub use cache::RatingCache;
pub use config::Config;
pub use error::{ConfigError, LightboxError, Outcome, Result, StageError, StageResult};
pub use metadata::MetadataExtractor;
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{Pipeline, RunIntent, RunSummary};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use scoring::{AestheticScorer, ScoreBackend, NEUTRAL_SCORE};
pub use types::{CaptureMetadata, Orientation, PhotoRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
