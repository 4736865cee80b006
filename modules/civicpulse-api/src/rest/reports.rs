//! Citizen-facing report routes.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use civicpulse_common::Report;
use civicpulse_store::{NearbyReport, NewReport};

use super::{json_body, number, query, report_id};
use crate::auth::Caller;
use crate::classify;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct NearbyParams {
    lat: Option<String>,
    #[serde(alias = "lon")]
    lng: Option<String>,
    radius: Option<String>,
    limit: Option<String>,
}

/// POST /reports/smart-create
pub async fn smart_create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<NewReport>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let input = json_body(payload)?;
    let input = classify::complete(input, state.classifier.as_ref()).await;
    let report = state.reports.create(input, &caller.context).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /report/{id}
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Report>> {
    let id = report_id(path)?;
    Ok(Json(state.reports.get(id).await?))
}

/// POST /report/{id}/upvote
pub async fn upvote(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Report>> {
    let id = report_id(path)?;
    Ok(Json(state.reports.upvote(id, &caller.context).await?))
}

/// GET /reports/nearby?lat=&lng=&radius=&limit=
pub async fn nearby(
    State(state): State<Arc<AppState>>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> ApiResult<Json<Vec<NearbyReport>>> {
    let params = query(params)?;
    let hits = state
        .reports
        .nearby(
            number("lat", params.lat.as_deref())?,
            number("lng", params.lng.as_deref())?,
            number("radius", params.radius.as_deref())?,
            number("limit", params.limit.as_deref())?,
        )
        .await?;
    Ok(Json(hits))
}

/// GET /reports/mine
pub async fn mine(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.reports.my_reports(&caller.context).await?))
}
