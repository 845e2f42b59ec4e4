//! Error taxonomy for the session lifecycle.

/// Errors surfaced by the session manager and the request gate.
///
/// Callers are expected to drop any client-side session state on
/// `InvalidOrExpired`, `ReuseDetected` or `InvalidToken`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Request payload failed basic validation (empty name, malformed email, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown email or wrong password. The two causes share this variant.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration collided with an existing principal.
    #[error("principal already exists")]
    AlreadyExists,

    /// The presented refresh secret is unknown, expired or was never issued.
    #[error("invalid or expired refresh token")]
    InvalidOrExpired,

    /// A revoked refresh secret was presented again; every session of the
    /// owner has been revoked before this error was returned.
    #[error("refresh token reuse detected, all sessions revoked")]
    ReuseDetected,

    /// Access token signature, format or expiry check failed.
    #[error("invalid or expired access token")]
    InvalidToken,

    /// No usable bearer credential on a protected request: the header is
    /// missing, malformed, or carries a token that failed verification.
    #[error("missing or invalid access token")]
    Unauthorized,

    /// Authenticated, but the role is not in the permitted set.
    #[error("insufficient permissions")]
    Forbidden,

    /// A collaborator (store, directory, hasher) failed.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// Whether the client should forget its stored refresh secret.
    #[must_use]
    pub const fn clears_client_session(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrExpired | Self::ReuseDetected | Self::InvalidToken
        )
    }
}
