pub mod auth;
pub mod classify;
pub mod error;
pub mod jwt;
pub mod rest;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use civicpulse_store::{
    InMemoryReportStore, InMemoryUserStore, ReportRepository, ReportService, StoreSettings,
    UserRepository, UserService,
};

use classify::{Classifier, FallbackClassifier};
use jwt::JwtService;

pub struct AppState {
    pub reports: ReportService,
    pub users: UserService,
    pub jwt: JwtService,
    pub classifier: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        users: Arc<dyn UserRepository>,
        settings: StoreSettings,
        jwt: JwtService,
    ) -> Self {
        Self {
            reports: ReportService::new(reports, settings),
            users: UserService::new(users),
            jwt,
            classifier: Arc::new(FallbackClassifier),
        }
    }

    /// State backed by the in-process store.
    pub fn in_memory(settings: StoreSettings, jwt: JwtService) -> Self {
        Self::new(
            Arc::new(InMemoryReportStore::new()),
            Arc::new(InMemoryUserStore::new()),
            settings,
            jwt,
        )
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Citizen
        .route("/reports/smart-create", post(rest::reports::smart_create))
        .route("/reports/nearby", get(rest::reports::nearby))
        .route("/reports/mine", get(rest::reports::mine))
        .route("/report/{id}", get(rest::reports::get_report))
        .route("/report/{id}/upvote", post(rest::reports::upvote))
        // Users
        .route("/user", post(rest::users::sync_user))
        .route("/users/me", get(rest::users::me))
        // Admin
        .route("/admin/reports", get(rest::admin::list_reports))
        .route("/admin/report/{id}/status", put(rest::admin::update_status))
        .route("/admin/analytics/heatmap", get(rest::admin::heatmap))
        .route("/admin/analytics/kpis", get(rest::admin::kpis))
        .route("/admin/users", get(rest::admin::list_users))
        .with_state(state)
}
