//! Report lifecycle: `Submitted → InProgress → Resolved`.
//!
//! Transport and identity agnostic. Authorization happens in the service layer.

use chrono::{DateTime, Utc};

use civicpulse_common::{Report, ReportStatus};

use crate::error::StoreError;
use crate::validate::StatusPatch;

/// Forward moves and self-transitions are legal; nothing moves backwards.
pub fn can_transition(from: ReportStatus, to: ReportStatus) -> bool {
    use ReportStatus::*;
    matches!(
        (from, to),
        (Submitted, Submitted)
            | (Submitted, InProgress)
            | (Submitted, Resolved)
            | (InProgress, InProgress)
            | (InProgress, Resolved)
            | (Resolved, Resolved)
    )
}

pub fn check_transition(from: ReportStatus, to: ReportStatus) -> Result<(), StoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}

/// Apply a validated patch in place.
///
/// Returns `Ok(false)` when the patch is a pure self-transition with no
/// annotations, in which case the report (including `updated_at`) is untouched.
/// On error the report is untouched.
pub fn apply(report: &mut Report, patch: &StatusPatch, now: DateTime<Utc>) -> Result<bool, StoreError> {
    check_transition(report.status, patch.status)?;

    if report.status == patch.status && !patch.has_annotations() {
        return Ok(false);
    }

    report.status = patch.status;
    if let Some(notes) = &patch.notes {
        report.notes = Some(notes.clone());
    }
    if let Some(url) = &patch.progress_image_url {
        report.progress_image_url = Some(url.clone());
    }
    if let Some(url) = &patch.resolved_image_url {
        report.resolved_image_url = Some(url.clone());
    }
    touch(report, now);
    if report.status == ReportStatus::Resolved && report.resolved_at.is_none() {
        report.resolved_at = Some(report.updated_at);
    }
    Ok(true)
}

/// Stamp `updated_at`, never letting it fall behind `created_at` or move backwards.
pub fn touch(report: &mut Report, now: DateTime<Utc>) {
    report.updated_at = now.max(report.updated_at).max(report.created_at);
}
