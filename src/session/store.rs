//! Refresh credential records and the storage contract.
//!
//! Storage holds rows, not policy. Callers pass digests and ids; no operation
//! sees a raw refresh secret.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::secret::SecretDigest;

/// One persisted refresh credential (one logged-in session/device).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshCredential {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub digest: SecretDigest,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshCredential {
    /// Usable for exactly one rotation: not revoked and not yet expired.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Values for a new row; the store assigns nothing else but defaults.
#[derive(Clone, Debug)]
pub struct NewRefreshCredential {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub digest: SecretDigest,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewRefreshCredential {
    #[must_use]
    pub fn new(owner_id: Uuid, digest: SecretDigest, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            digest,
            expires_at,
            created_at: now,
        }
    }
}

/// Result of the atomic conditional revoke used by rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The row was active and is now revoked; this caller won the race.
    Consumed(RefreshCredential),
    /// The row exists but was already revoked: a replay.
    AlreadyRevoked { owner_id: Uuid },
    /// The row exists, is not revoked, but is past its expiry.
    Expired,
    /// No row carries this digest (never issued, or swept).
    NotFound,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new, non-revoked credential.
    async fn insert(&self, new: NewRefreshCredential) -> Result<RefreshCredential>;

    /// Find the credential for `digest` if it is neither revoked nor expired at `now`.
    async fn find_active(
        &self,
        digest: &SecretDigest,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshCredential>>;

    /// Revoke the row for `digest` if it is active at `now`, stamping
    /// `last_used_at`, and report what was found otherwise. Must be atomic
    /// with respect to concurrent calls for the same digest.
    async fn consume(&self, digest: &SecretDigest, now: DateTime<Utc>) -> Result<ConsumeOutcome>;

    /// Returns whether a still-unrevoked row was revoked.
    async fn revoke(&self, id: Uuid) -> Result<bool>;

    /// Revoke every credential of `owner_id`; returns how many changed.
    async fn revoke_all_for_owner(&self, owner_id: Uuid) -> Result<u64>;

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Maintenance sweep: delete rows whose expiry is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
