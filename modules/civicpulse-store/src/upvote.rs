//! At-most-one upvote per (report, user).
//!
//! The ledger holds the durable markers. [`apply_upvote`] must run while the
//! caller holds the report's write lock, which makes marker insertion and the
//! counter bump a single step with respect to every other writer of that report.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use uuid::Uuid;

use civicpulse_common::Report;

use crate::error::StoreError;
use crate::lifecycle::touch;

#[derive(Default)]
pub struct UpvoteLedger {
    markers: DashSet<(Uuid, String)>,
}

impl UpvoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the marker was already present.
    pub fn try_record(&self, report_id: Uuid, user_id: &str) -> bool {
        self.markers.insert((report_id, user_id.to_string()))
    }

    pub fn has_upvoted(&self, report_id: Uuid, user_id: &str) -> bool {
        self.markers.contains(&(report_id, user_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

pub fn check_user(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "upvoting requires a caller id".to_string(),
        ));
    }
    Ok(())
}

/// Record the marker and bump the counter. Leaves `report` untouched on error.
pub fn apply_upvote(
    ledger: &UpvoteLedger,
    report: &mut Report,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    check_user(user_id)?;
    if !ledger.try_record(report.id, user_id) {
        return Err(StoreError::AlreadyUpvoted {
            report_id: report.id,
            user_id: user_id.to_string(),
        });
    }
    report.upvotes += 1;
    touch(report, now);
    Ok(())
}
