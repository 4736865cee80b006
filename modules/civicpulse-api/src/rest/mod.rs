pub mod admin;
pub mod reports;
pub mod users;

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query};
use serde::Deserialize;
use uuid::Uuid;

use civicpulse_store::ReportFilter;

use crate::error::{ApiError, ApiResult};

// --- Extraction helpers ---
//
// Handlers take `Result<Extractor, Rejection>` so malformed requests get the
// same error body as every other failure.

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub(crate) fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(params)| params)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub(crate) fn report_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::BadRequest("report id must be a UUID".to_string()))
}

/// Parse an optional numeric query value. Blank counts as absent.
pub(crate) fn number<T: FromStr>(field: &str, raw: Option<&str>) -> ApiResult<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{field} must be a number, got {s:?}"))),
    }
}

// --- Shared query structs ---

/// Facets shared by the admin list, heatmap and KPI routes.
#[derive(Debug, Default, Deserialize)]
pub struct FacetQuery {
    department: Option<String>,
    category: Option<String>,
    status: Option<String>,
    #[serde(rename = "startDate", alias = "start_date")]
    start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    end_date: Option<String>,
}

impl FacetQuery {
    pub fn filter(&self) -> ApiResult<ReportFilter> {
        Ok(ReportFilter::from_params(
            self.department.as_deref(),
            self.category.as_deref(),
            self.status.as_deref(),
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?)
    }
}
