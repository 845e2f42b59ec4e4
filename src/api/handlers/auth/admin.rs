use axum::{extract::Extension, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{types::SweepResponse, AuthState};
use crate::api::error::{ApiError, ErrorResponse};
use crate::session::AccessClaims;

#[utoipa::path(
    post,
    path = "/v1/admin/sessions/sweep",
    responses(
        (status = 200, description = "Expired refresh credentials deleted", body = SweepResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(principal_id = %claims.sub))]
pub async fn sweep(claims: AccessClaims, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    match auth_state.manager().sweep_expired().await {
        Ok(deleted) => {
            info!(deleted, "manual credential sweep");
            Json(SweepResponse { deleted }).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}
