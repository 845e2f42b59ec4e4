//! # Larder (session and token lifecycle)
//!
//! `larder` issues and rotates the credentials behind the recipe-sharing API.
//!
//! ## Credentials
//!
//! - **Access tokens** are short-lived signed JWTs (HS256). They are verified
//!   offline from the signing key alone, so revoking refresh credentials does
//!   not invalidate access tokens already in flight.
//! - **Refresh secrets** are opaque random strings. Only their SHA-256 digest
//!   is stored, and each one can be exchanged exactly once.
//!
//! ## Rotation and reuse detection
//!
//! Presenting a refresh secret consumes its credential and yields a new pair.
//! The new credential keeps the expiry of the one it replaced, so a chain of
//! rotations can never outlive the original login. Presenting a secret that
//! was already consumed or revoked is treated as theft: every credential the
//! owner holds is revoked and the client must log in again.
//!
//! ## Request gate
//!
//! Protected routes require `Authorization: Bearer <access token>`. Missing or
//! invalid tokens get `401 Unauthorized`; a valid token whose role is not on
//! the route's allow-list gets `403 Forbidden`.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
