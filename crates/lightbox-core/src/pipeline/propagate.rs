//! Tag propagation: apply audit decisions to display artifacts.
//!
//! Propagation is serial on purpose. All writes go through a single
//! persistent exiftool session, and exiftool rewrites files in place;
//! one writer keeps the failure modes simple.

use std::path::PathBuf;

use crate::error::StageResult;
use crate::exiftool::ExifToolSession;
use crate::pipeline::audit::AuditAction;
use crate::progress::ProgressCounter;

/// One scheduled metadata write.
#[derive(Debug, Clone)]
pub struct PropagationJob {
    pub source: PathBuf,
    pub artifact: PathBuf,
    pub action: AuditAction,
}

/// Result of a propagation batch.
#[derive(Debug, Default)]
pub struct PropagationReport {
    pub applied: usize,
    pub failed: usize,
}

/// Runs a batch of propagation jobs through one exiftool session.
pub struct Propagator {
    exiftool_bin: String,
}

impl Propagator {
    pub fn new(exiftool_bin: &str) -> Self {
        Self {
            exiftool_bin: exiftool_bin.to_string(),
        }
    }

    /// Apply every job in order. The first failed job aborts the rest
    /// of the batch: the session state is suspect past that point, and
    /// both job kinds are idempotent, so a re-run repairs whatever was
    /// left undone.
    pub fn run(
        &self,
        jobs: &[PropagationJob],
        counter: &ProgressCounter,
    ) -> StageResult<PropagationReport> {
        if jobs.is_empty() {
            return Ok(PropagationReport::default());
        }

        let mut session = ExifToolSession::spawn(&self.exiftool_bin)?;
        let mut report = PropagationReport::default();

        for job in jobs {
            let result = match job.action {
                AuditAction::CopyAll => session.copy_tags(&job.source, &job.artifact),
                AuditAction::ClearDates => session.clear_date_tags(&job.artifact),
            };
            counter.add(1);

            if let Err(e) = result {
                tracing::warn!(
                    "Tag propagation failed after {} of {} jobs: {}",
                    report.applied,
                    jobs.len(),
                    e
                );
                session.close();
                return Err(e);
            }
            report.applied += 1;
        }

        session.close();
        Ok(report)
    }
}

/// Build a job for an audited pair, if the audit asked for one.
pub fn job_for(
    source: &std::path::Path,
    artifact: &std::path::Path,
    action: Option<AuditAction>,
) -> Option<PropagationJob> {
    action.map(|action| PropagationJob {
        source: source.to_path_buf(),
        artifact: artifact.to_path_buf(),
        action,
    })
}
