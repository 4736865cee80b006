use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use civicpulse_common::CallerContext;

use crate::error::ApiError;
use crate::jwt::parse_auth_cookie;
use crate::AppState;

/// Authenticated caller. Extract this in handlers that need an identity.
/// A missing or invalid token rejects the request with 401.
#[derive(Debug, Clone)]
pub struct Caller {
    pub context: CallerContext,
    pub email: String,
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = request_token(parts)
            .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

        let claims = state.jwt.verify_token(token).map_err(|e| {
            debug!(error = %e, "Rejected token");
            ApiError::Unauthenticated("invalid or expired token".to_string())
        })?;

        if claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthenticated("token has no subject".to_string()));
        }

        Ok(Caller {
            context: CallerContext::new(claims.sub, claims.role),
            email: claims.email,
        })
    }
}

/// `Authorization: Bearer <token>`, falling back to the auth cookie.
fn request_token(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_auth_cookie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: (&str, &str)) -> Parts {
        let (parts, _) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn bearer_header_wins() {
        let p = parts(("authorization", "Bearer abc"));
        assert_eq!(request_token(&p), Some("abc"));
    }

    #[test]
    fn cookie_is_a_fallback() {
        let p = parts(("cookie", "theme=dark; auth_token=xyz"));
        assert_eq!(request_token(&p), Some("xyz"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let p = parts(("authorization", "Basic dXNlcjpwYXNz"));
        assert_eq!(request_token(&p), None);
    }
}
