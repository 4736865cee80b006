//! Storage seams. The service layer only ever talks to these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use civicpulse_common::{Report, Role, User};

use crate::error::StoreError;
use crate::heatmap::HeatmapCell;
use crate::proximity::{NearbyQuery, NearbyReport};
use crate::query::{Page, PageRequest, ReportFilter};
use crate::validate::StatusPatch;

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persist a validated report. Once this returns, the report is visible to
    /// every read path, spatial ones included.
    async fn insert(&self, report: Report) -> Result<Report, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Report>, StoreError>;

    /// Apply a lifecycle transition as one atomic step on the stored report.
    async fn apply_status(
        &self,
        id: Uuid,
        patch: &StatusPatch,
        now: DateTime<Utc>,
    ) -> Result<Report, StoreError>;

    /// Record the (report, user) marker and bump the counter as one atomic step.
    async fn upvote(&self, id: Uuid, user_id: &str, now: DateTime<Utc>) -> Result<Report, StoreError>;

    async fn list(&self, filter: &ReportFilter, page: PageRequest) -> Result<Page<Report>, StoreError>;

    /// All reports matching `filter`, unordered.
    async fn matching(&self, filter: &ReportFilter) -> Result<Vec<Report>, StoreError>;

    /// Reports filed by one citizen, newest first.
    async fn by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>, StoreError>;

    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyReport>, StoreError>;

    async fn heatmap(
        &self,
        filter: &ReportFilter,
        precision: usize,
    ) -> Result<Vec<HeatmapCell>, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or refresh by external id. `role: None` keeps the stored role
    /// (or `citizen` for a new user).
    async fn upsert(
        &self,
        id: &str,
        email: &str,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;
}
