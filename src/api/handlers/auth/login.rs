use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{issued_response, types::LoginRequest, AuthState};
use crate::api::error::{ApiError, ErrorResponse};
use crate::session::SessionError;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = super::types::SessionResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state))]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError(SessionError::InvalidInput("missing payload".to_string())).into_response();
    };

    match auth_state
        .manager()
        .login(&request.email, &request.password)
        .await
    {
        Ok(issued) => issued_response(&auth_state, StatusCode::OK, issued),
        Err(err) => ApiError(err).into_response(),
    }
}
