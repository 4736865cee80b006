//! Admin dashboard routes. Every handler here needs the admin role; the
//! façade enforces it.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use civicpulse_common::{Report, User};
use civicpulse_store::{HeatmapCell, Kpis, Page, PageRequest, StatusUpdate};

use super::{json_body, number, query, report_id, FacetQuery};
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(flatten)]
    facets: FacetQuery,
    page: Option<String>,
    #[serde(alias = "pageSize")]
    page_size: Option<String>,
}

#[derive(Deserialize)]
pub struct HeatmapParams {
    #[serde(flatten)]
    facets: FacetQuery,
    precision: Option<String>,
}

/// GET /admin/reports
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Page<Report>>> {
    let params = query(params)?;
    let filter = params.facets.filter()?;
    let page = PageRequest::new(
        number("page", params.page.as_deref())?.unwrap_or(1),
        number("page_size", params.page_size.as_deref())?
            .unwrap_or(PageRequest::DEFAULT_PAGE_SIZE as i64),
    )?;
    Ok(Json(state.reports.list(&filter, page, &caller.context).await?))
}

/// PUT /admin/report/{id}/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Report>> {
    let id = report_id(path)?;
    let update = json_body(payload)?;
    Ok(Json(
        state
            .reports
            .update_status(id, update, &caller.context)
            .await?,
    ))
}

/// GET /admin/analytics/heatmap
pub async fn heatmap(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    params: Result<Query<HeatmapParams>, QueryRejection>,
) -> ApiResult<Json<Vec<HeatmapCell>>> {
    let params = query(params)?;
    let filter = params.facets.filter()?;
    let precision = number("precision", params.precision.as_deref())?;
    Ok(Json(
        state
            .reports
            .heatmap(&filter, precision, &caller.context)
            .await?,
    ))
}

/// GET /admin/analytics/kpis
pub async fn kpis(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    params: Result<Query<FacetQuery>, QueryRejection>,
) -> ApiResult<Json<Kpis>> {
    let filter = query(params)?.filter()?;
    Ok(Json(state.reports.kpis(&filter, &caller.context).await?))
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.users.list_users(&caller.context).await?))
}
