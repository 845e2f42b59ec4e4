//! Auth handlers: registration, login, refresh rotation and logout.
//!
//! The refresh secret travels in the `larder_refresh` cookie, scoped to
//! `/v1/auth`. Non-browser clients may send it as `refresh_token` in a JSON
//! body instead. Access tokens go in the response body and come back as
//! `Authorization: Bearer`.

pub(crate) mod admin;
pub(crate) mod cookies;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod me;
pub(crate) mod refresh;
pub(crate) mod register;
mod state;
pub(crate) mod types;

pub use state::{AuthConfig, AuthState};

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use tracing::error;

use crate::session::IssuedSession;
use types::SessionResponse;

/// Body plus refresh cookie for a freshly issued pair.
pub(crate) fn issued_response(
    state: &AuthState,
    status: StatusCode,
    issued: IssuedSession,
) -> Response {
    let max_age = issued.refresh_max_age_seconds();
    let mut headers = HeaderMap::new();
    match cookies::refresh_cookie(
        state.config(),
        issued.refresh_secret.expose_secret(),
        max_age,
    ) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let body = SessionResponse {
        access_token: issued.access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.manager().config().access_ttl().as_secs(),
        principal: issued.principal,
    };
    (status, headers, Json(body)).into_response()
}

/// Attach a cookie-clearing header to `response`.
pub(crate) fn with_cleared_cookie(state: &AuthState, mut response: Response) -> Response {
    if let Ok(cookie) = cookies::clear_refresh_cookie(state.config()) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
