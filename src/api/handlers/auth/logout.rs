use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{cookies::extract_refresh_cookie, types::RefreshRequest, with_cleared_cookie, AuthState};
use crate::api::error::{ApiError, ErrorResponse};
use crate::session::AccessClaims;

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body(content = RefreshRequest, description = "Only needed without the refresh cookie"),
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let presented = extract_refresh_cookie(&headers)
        .or_else(|| payload.and_then(|Json(request)| request.refresh_token));

    if let Some(presented) = presented {
        if let Err(err) = auth_state.manager().logout(&presented).await {
            error!("Failed to revoke refresh credential: {err}");
        }
    }

    // Always clear the cookie, even if revocation failed.
    with_cleared_cookie(&auth_state, StatusCode::NO_CONTENT.into_response())
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every session of the caller revoked"),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(principal_id = %claims.sub))]
pub async fn logout_all(
    claims: AccessClaims,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match auth_state.manager().logout_all(claims.sub).await {
        Ok(_) => with_cleared_cookie(&auth_state, StatusCode::NO_CONTENT.into_response()),
        Err(err) => ApiError(err).into_response(),
    }
}
