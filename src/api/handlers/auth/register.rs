use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{issued_response, types::RegisterRequest, AuthState};
use crate::api::error::{ApiError, ErrorResponse};
use crate::session::SessionError;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Principal created and logged in", body = super::types::SessionResponse),
        (status = 400, description = "Invalid name, email or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(auth_state))]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError(SessionError::InvalidInput("missing payload".to_string())).into_response();
    };

    match auth_state
        .manager()
        .register(&request.name, &request.email, &request.password)
        .await
    {
        Ok(issued) => issued_response(&auth_state, StatusCode::CREATED, issued),
        Err(err) => ApiError(err).into_response(),
    }
}
