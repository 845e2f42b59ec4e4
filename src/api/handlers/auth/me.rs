use axum::{response::IntoResponse, Json};

use crate::api::error::ErrorResponse;
use crate::session::AccessClaims;

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Claims of the presented access token", body = AccessClaims),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "auth"
)]
pub async fn me(claims: AccessClaims) -> impl IntoResponse {
    Json(claims)
}
