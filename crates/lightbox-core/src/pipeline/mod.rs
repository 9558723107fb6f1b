//! The photo ingestion pipeline stages.
//!
//! - **scan**: find and time-order source photographs
//! - **derive**: produce the archival copy and display variant
//! - **audit**: decide which artifacts need metadata work
//! - **propagate**: apply audit decisions through exiftool
//! - **orchestrator**: run the stages and own cross-stage policy

pub mod audit;
pub mod derive;
pub mod orchestrator;
pub mod propagate;
pub mod scan;

// Re-exports for convenient access
pub use audit::{audit_decision, AuditAction, MetadataAuditor};
pub use derive::{crop_box, ArtifactLayout, ArtifactWriter};
pub use orchestrator::{Pipeline, RunIntent, RunSummary};
pub use propagate::{PropagationJob, PropagationReport, Propagator};
pub use scan::Scanner;
