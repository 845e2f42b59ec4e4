use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    cookies::extract_refresh_cookie, issued_response, types::RefreshRequest, with_cleared_cookie,
    AuthState,
};
use crate::api::error::{ApiError, ErrorResponse};
use crate::session::SessionError;

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body(content = RefreshRequest, description = "Only needed without the refresh cookie"),
    responses(
        (status = 200, description = "Rotated; new refresh cookie set", body = super::types::SessionResponse),
        (status = 401, description = "Missing, expired or reused refresh token; cookie cleared", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let presented = extract_refresh_cookie(&headers)
        .or_else(|| payload.and_then(|Json(request)| request.refresh_token))
        .filter(|secret| !secret.is_empty());

    let Some(presented) = presented else {
        return with_cleared_cookie(
            &auth_state,
            ApiError(SessionError::InvalidOrExpired).into_response(),
        );
    };

    match auth_state.manager().rotate(&presented).await {
        Ok(issued) => issued_response(&auth_state, StatusCode::OK, issued),
        Err(err) => {
            let clear = err.clears_client_session();
            let response = ApiError(err).into_response();
            if clear {
                with_cleared_cookie(&auth_state, response)
            } else {
                response
            }
        }
    }
}
