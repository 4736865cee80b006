use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::geo::GeoPoint;

// --- Enums ---

/// Lifecycle of a report. Ordered: a report only ever moves rightwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    Submitted,
    #[serde(rename = "In Progress", alias = "InProgress", alias = "in_progress")]
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 3] = [
        ReportStatus::Submitted,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Submitted => "Submitted",
            ReportStatus::InProgress => "In Progress",
            ReportStatus::Resolved => "Resolved",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Submitted" | "submitted" => Ok(ReportStatus::Submitted),
            "In Progress" | "InProgress" | "in_progress" | "in progress" => {
                Ok(ReportStatus::InProgress)
            }
            "Resolved" | "resolved" => Ok(ReportStatus::Resolved),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Citizen,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" => Ok(Role::Citizen),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

// --- Records ---

/// A citizen-submitted civic issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: String,
    pub title: String,
    pub category: String,
    pub urgency: String,
    pub assigned_department: String,
    pub original_text: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub voice_note_url: Option<String>,
    pub location: GeoPoint,
    pub status: ReportStatus,
    pub notes: Option<String>,
    pub progress_image_url: Option<String>,
    pub resolved_image_url: Option<String>,
    pub upvotes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// First time the report reached `Resolved`. Later activity leaves it alone.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Mirror of an identity-provider account. `id` is the provider's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Who is calling, as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub role: Role,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn citizen(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Citizen)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_display_names() {
        assert_eq!(
            serde_json::to_value(ReportStatus::InProgress).unwrap(),
            serde_json::json!("In Progress")
        );
        let parsed: ReportStatus = serde_json::from_value(serde_json::json!("InProgress")).unwrap();
        assert_eq!(parsed, ReportStatus::InProgress);
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!("Resolved".parse::<ReportStatus>(), Ok(ReportStatus::Resolved));
        assert!("Closed".parse::<ReportStatus>().is_err());
        assert!("".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(ReportStatus::Submitted < ReportStatus::InProgress);
        assert!(ReportStatus::InProgress < ReportStatus::Resolved);
    }

    #[test]
    fn role_defaults_to_citizen() {
        assert_eq!(Role::default(), Role::Citizen);
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("superuser".parse::<Role>().is_err());
    }
}
