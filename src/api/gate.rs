//! Request gate for protected routes.
//!
//! [`authenticate`] verifies the bearer token and stores the claims in the
//! request extensions. [`authorize`] runs after it and checks the caller's
//! role against an allow-list. Handlers take [`AccessClaims`] as an extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;
use super::handlers::auth::{cookies::extract_bearer_token, AuthState};
use crate::session::{AccessClaims, Role, SessionError};

/// Reject requests without a valid access token.
pub async fn authenticate(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return ApiError(SessionError::Unauthorized).into_response();
    };

    match auth_state.manager().verify_access_token(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            debug!("gate rejected access token: {err}");
            ApiError(SessionError::Unauthorized).into_response()
        }
    }
}

/// Roles permitted past [`authorize`].
#[derive(Clone, Copy, Debug)]
pub struct AllowedRoles(pub &'static [Role]);

impl AllowedRoles {
    pub const ADMIN: Self = Self(&[Role::Admin]);

    #[must_use]
    pub fn permits(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

/// Reject authenticated callers whose role is not allowed. Must run after
/// [`authenticate`].
pub async fn authorize(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Response {
    let Some(claims) = request.extensions().get::<AccessClaims>() else {
        return ApiError(SessionError::Unauthorized).into_response();
    };

    if allowed.permits(claims.role) {
        next.run(request).await
    } else {
        debug!(principal_id = %claims.sub, role = %claims.role, "role not permitted");
        ApiError(SessionError::Forbidden).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AccessClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(ApiError(SessionError::Unauthorized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_allow_list() {
        assert!(AllowedRoles::ADMIN.permits(Role::Admin));
        assert!(!AllowedRoles::ADMIN.permits(Role::RegularUser));
        assert!(AllowedRoles(&[Role::RegularUser, Role::Admin]).permits(Role::RegularUser));
    }
}
