use std::sync::Arc;

use axum::{extract::State, response::Json};

use civicpulse_common::User;

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;

/// POST /user
///
/// Mirrors the caller's identity-provider account locally. The id, email and
/// role all come from the verified token, never from the request body.
pub async fn sync_user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Json<User>> {
    let user = state
        .users
        .sync_user(&caller.context.user_id, &caller.email, Some(caller.context.role))
        .await?;
    Ok(Json(user))
}

/// GET /users/me
pub async fn me(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<User>> {
    Ok(Json(state.users.get_user(&caller.context.user_id).await?))
}
