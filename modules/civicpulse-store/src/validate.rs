//! Pure validation of inbound writes.
//!
//! Every write entering the store passes through one of these functions first.
//! None of them touch storage; a rejected input leaves no trace.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use civicpulse_common::{GeoPoint, Report, ReportStatus};

use crate::error::ValidationError;

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_TEXT_LEN: usize = 500;
pub const MAX_LABEL_LEN: usize = 100;
pub const MAX_URL_LEN: usize = 2048;
pub const MAX_NOTES_LEN: usize = 2000;

// --- Input shapes ---

/// A report as submitted by a citizen, enriched with the classifier's fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    pub title: Option<String>,
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub assigned_department: Option<String>,
    #[serde(alias = "text")]
    pub original_text: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub voice_note_url: Option<String>,
    pub location: Option<LocationInput>,
}

/// Either a GeoJSON-style `coordinates: [lng, lat]` array or a `{lat, lon}` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LocationInput {
    Coordinates {
        coordinates: Vec<f64>,
    },
    LatLon {
        lat: f64,
        #[serde(alias = "lng")]
        lon: f64,
    },
}

impl LocationInput {
    pub fn to_point(&self) -> Result<GeoPoint, ValidationError> {
        match self {
            LocationInput::Coordinates { coordinates } => match coordinates.as_slice() {
                [lng, lat] => Ok(GeoPoint::new(*lng, *lat)?),
                other => Err(ValidationError::Location(format!(
                    "expected [longitude, latitude], got {} values",
                    other.len()
                ))),
            },
            LocationInput::LatLon { lat, lon } => Ok(GeoPoint::new(*lon, *lat)?),
        }
    }
}

/// Admin request to move a report through its lifecycle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub progress_image_url: Option<String>,
    pub resolved_image_url: Option<String>,
}

/// A validated [`StatusUpdate`]. Annotations left as `None` are not touched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub status: ReportStatus,
    pub notes: Option<String>,
    pub progress_image_url: Option<String>,
    pub resolved_image_url: Option<String>,
}

impl StatusPatch {
    pub fn to(status: ReportStatus) -> Self {
        Self {
            status,
            notes: None,
            progress_image_url: None,
            resolved_image_url: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn has_annotations(&self) -> bool {
        self.notes.is_some() || self.progress_image_url.is_some() || self.resolved_image_url.is_some()
    }
}

// --- Validators ---

/// Build a fresh `Submitted` report from citizen input.
pub fn validate_report_create(
    input: NewReport,
    reporter_id: &str,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Report, ValidationError> {
    let reporter_id = required(Some(reporter_id.to_string()), "reporter_id", MAX_LABEL_LEN * 2)?;
    let location = input
        .location
        .as_ref()
        .ok_or(ValidationError::Missing { field: "location" })?
        .to_point()?;

    Ok(Report {
        id,
        reporter_id,
        title: required(input.title, "title", MAX_TITLE_LEN)?,
        category: required(input.category, "category", MAX_LABEL_LEN)?,
        urgency: required(input.urgency, "urgency", MAX_LABEL_LEN)?,
        assigned_department: required(
            input.assigned_department,
            "assigned_department",
            MAX_LABEL_LEN,
        )?,
        original_text: optional(input.original_text, "original_text", MAX_TEXT_LEN)?,
        image_url: optional(input.image_url, "image_url", MAX_URL_LEN)?,
        video_url: optional(input.video_url, "video_url", MAX_URL_LEN)?,
        voice_note_url: optional(input.voice_note_url, "voice_note_url", MAX_URL_LEN)?,
        location,
        status: ReportStatus::Submitted,
        notes: None,
        progress_image_url: None,
        resolved_image_url: None,
        upvotes: 0,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    })
}

pub fn validate_status_update(input: StatusUpdate) -> Result<StatusPatch, ValidationError> {
    let raw = input
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::Missing { field: "status" })?;

    Ok(StatusPatch {
        status: raw.parse()?,
        notes: optional(input.notes, "notes", MAX_NOTES_LEN)?,
        progress_image_url: optional(input.progress_image_url, "progress_image_url", MAX_URL_LEN)?,
        resolved_image_url: optional(input.resolved_image_url, "resolved_image_url", MAX_URL_LEN)?,
    })
}

/// Normalise an identity-provider assertion. Returns `(id, email)`.
pub fn validate_user_sync(id: &str, email: &str) -> Result<(String, String), ValidationError> {
    let id = required(Some(id.to_string()), "id", MAX_LABEL_LEN * 2)?;
    let email = required(Some(email.to_string()), "email", 320)?.to_lowercase();

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok((id, email))
        }
        _ => Err(ValidationError::Invalid {
            field: "email",
            reason: format!("{email} is not an email address"),
        }),
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    optional(value, field, max)?.ok_or(ValidationError::Missing { field })
}

fn optional(
    value: Option<String>,
    field: &'static str,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(Some(trimmed.to_string()))
}
