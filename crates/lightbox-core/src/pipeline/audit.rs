//! Metadata audit: decide which display artifacts need tag propagation.
//!
//! The audit reads only capture date tags. Dates are the tags the rest
//! of the system depends on (sort order, display), and a date mismatch
//! is the reliable tell that an artifact predates its source's current
//! metadata.

use std::path::Path;

use crate::error::Outcome;
use crate::exiftool::{DateTags, ExifTool};
use crate::progress::ProgressCounter;

/// What the propagation pass should do to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Copy the full tag set from the source onto the artifact.
    CopyAll,
    /// The source carries no capture date but the artifact does: the
    /// artifact's date is stale. Clear it.
    ClearDates,
}

/// Compare date tags and decide whether the artifact needs work.
///
/// `None` for a side means its tags could not be read; the decision is
/// then conservative, since both actions are idempotent.
pub fn audit_decision(
    source: Option<&DateTags>,
    artifact: Option<&DateTags>,
) -> Option<AuditAction> {
    match (source, artifact) {
        (Some(src), Some(art)) => match (src.effective(), art.effective()) {
            (Some(s), Some(a)) if s == a => None,
            (Some(_), _) => Some(AuditAction::CopyAll),
            (None, Some(_)) => Some(AuditAction::ClearDates),
            (None, None) => None,
        },
        // Source unreadable: re-copy so the artifact cannot drift.
        (None, Some(_)) => Some(AuditAction::CopyAll),
        (Some(src), None) => {
            if src.effective().is_some() {
                Some(AuditAction::CopyAll)
            } else {
                Some(AuditAction::ClearDates)
            }
        }
        (None, None) => Some(AuditAction::CopyAll),
    }
}

/// Audits source/artifact pairs through exiftool.
pub struct MetadataAuditor {
    tool: ExifTool,
}

impl MetadataAuditor {
    pub fn new(exiftool_bin: &str) -> Self {
        Self {
            tool: ExifTool::new(exiftool_bin),
        }
    }

    /// Audit one pair. Advances the counter whether or not the reads
    /// succeed so progress reflects attempts, not outcomes. Any read
    /// failure resolves toward re-propagation rather than leaving
    /// possibly stale tags in place.
    pub fn audit(
        &self,
        source: &Path,
        artifact: &Path,
        counter: &ProgressCounter,
    ) -> Outcome<Option<AuditAction>> {
        let src = self.tool.read_date_tags(source);
        let art = self.tool.read_date_tags(artifact);
        counter.add(1);

        match (src, art) {
            // Both sides unreadable still flags the pair; a broken tool
            // surfaces in the propagation pass.
            (Err(e), Err(_)) => {
                tracing::debug!("Date tags unreadable on both sides: {}", e);
                Outcome::Success(Some(AuditAction::CopyAll))
            }
            (src, art) => Outcome::Success(audit_decision(src.ok().as_ref(), art.ok().as_ref())),
        }
    }
}
