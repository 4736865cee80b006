//! The Report Store façade.
//!
//! Every caller-facing operation goes through here: authorization first, then
//! validation, then storage. Handlers never talk to a repository directly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use civicpulse_common::{CallerContext, Config, Report, Role, User};

use crate::analytics::{self, Kpis};
use crate::error::StoreError;
use crate::heatmap::{HeatmapCell, DEFAULT_HEATMAP_PRECISION};
use crate::proximity::{NearbyQuery, NearbyReport};
use crate::query::{Page, PageRequest, ReportFilter};
use crate::repository::{ReportRepository, UserRepository};
use crate::upvote::check_user;
use crate::validate::{
    validate_report_create, validate_status_update, validate_user_sync, NewReport, StatusUpdate,
};

pub const DEFAULT_NEARBY_RADIUS_M: f64 = 5_000.0;

/// Query defaults taken from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub nearby_default_radius_m: f64,
    /// Upper bound on nearby results, applied even when the caller asks for more.
    pub nearby_max_results: Option<usize>,
    pub heatmap_precision: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            nearby_default_radius_m: DEFAULT_NEARBY_RADIUS_M,
            nearby_max_results: None,
            heatmap_precision: DEFAULT_HEATMAP_PRECISION,
        }
    }
}

impl StoreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            nearby_default_radius_m: config.nearby_default_radius_m,
            nearby_max_results: config.nearby_max_results.filter(|cap| *cap > 0),
            heatmap_precision: config.heatmap_precision,
        }
    }
}

fn require_admin(caller: &CallerContext, action: &str) -> Result<(), StoreError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(StoreError::Forbidden(format!("{action} requires the admin role")))
    }
}

// --- Reports ---

#[derive(Clone)]
pub struct ReportService {
    repo: Arc<dyn ReportRepository>,
    settings: StoreSettings,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportRepository>, settings: StoreSettings) -> Self {
        Self { repo, settings }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// File a new report on behalf of `caller`. The report starts `Submitted`
    /// with zero upvotes.
    pub async fn create(&self, input: NewReport, caller: &CallerContext) -> Result<Report, StoreError> {
        let report = validate_report_create(input, &caller.user_id, Uuid::new_v4(), Utc::now())?;
        let report = self.repo.insert(report).await?;
        info!(
            report_id = %report.id,
            category = %report.category,
            department = %report.assigned_department,
            "Report created"
        );
        Ok(report)
    }

    pub async fn get(&self, id: Uuid) -> Result<Report, StoreError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| StoreError::report_not_found(id))
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        caller: &CallerContext,
    ) -> Result<Report, StoreError> {
        require_admin(caller, "updating report status")?;
        let patch = validate_status_update(update)?;
        let report = self.repo.apply_status(id, &patch, Utc::now()).await?;
        info!(report_id = %id, status = %report.status, admin = %caller.user_id, "Report status updated");
        Ok(report)
    }

    pub async fn upvote(&self, id: Uuid, caller: &CallerContext) -> Result<Report, StoreError> {
        check_user(&caller.user_id)?;
        match self.repo.upvote(id, &caller.user_id, Utc::now()).await {
            Ok(report) => {
                info!(report_id = %id, upvotes = report.upvotes, "Report upvoted");
                Ok(report)
            }
            Err(e) => {
                debug!(report_id = %id, error = %e, "Upvote rejected");
                Err(e)
            }
        }
    }

    pub async fn list(
        &self,
        filter: &ReportFilter,
        page: PageRequest,
        caller: &CallerContext,
    ) -> Result<Page<Report>, StoreError> {
        require_admin(caller, "listing reports")?;
        self.repo.list(filter, page).await
    }

    pub async fn my_reports(&self, caller: &CallerContext) -> Result<Vec<Report>, StoreError> {
        self.repo.by_reporter(&caller.user_id).await
    }

    /// Reports within `radius_m` (or the configured default) of the point,
    /// nearest first.
    pub async fn nearby(
        &self,
        lat: Option<f64>,
        lng: Option<f64>,
        radius_m: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<NearbyReport>, StoreError> {
        let cap = self.settings.nearby_max_results.filter(|cap| *cap > 0);
        let limit = match (limit, cap) {
            (Some(asked), Some(cap)) => Some(asked.min(cap)),
            (asked, cap) => asked.or(cap),
        };
        let query = NearbyQuery::new(
            lat,
            lng,
            radius_m.unwrap_or(self.settings.nearby_default_radius_m),
            limit,
        )?;
        self.repo.nearby(&query).await
    }

    pub async fn heatmap(
        &self,
        filter: &ReportFilter,
        precision: Option<usize>,
        caller: &CallerContext,
    ) -> Result<Vec<HeatmapCell>, StoreError> {
        require_admin(caller, "the heatmap")?;
        self.repo
            .heatmap(filter, precision.unwrap_or(self.settings.heatmap_precision))
            .await
    }

    pub async fn kpis(&self, filter: &ReportFilter, caller: &CallerContext) -> Result<Kpis, StoreError> {
        require_admin(caller, "analytics")?;
        let reports = self.repo.matching(filter).await?;
        Ok(analytics::compute(&reports))
    }
}

// --- Users ---

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Mirror an identity-provider user locally. Safe to call on every sign-in.
    pub async fn sync_user(&self, id: &str, email: &str, role: Option<Role>) -> Result<User, StoreError> {
        let (id, email) = validate_user_sync(id, email)?;
        let user = self.repo.upsert(&id, &email, role, Utc::now()).await?;
        info!(user_id = %user.id, role = %user.role, "User synced");
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<User, StoreError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| StoreError::user_not_found(id))
    }

    pub async fn list_users(&self, caller: &CallerContext) -> Result<Vec<User>, StoreError> {
        require_admin(caller, "listing users")?;
        self.repo.list().await
    }
}
