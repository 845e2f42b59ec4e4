//! In-process implementations of the storage collaborators.
//!
//! Each store keeps its rows behind a single async mutex, so every operation,
//! including `consume`, is one critical section.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::principal::{
    CreateOutcome, NewPrincipal, Principal, PrincipalDirectory, PrincipalRecord,
};
use super::secret::SecretDigest;
use super::store::{ConsumeOutcome, CredentialStore, NewRefreshCredential, RefreshCredential};

#[derive(Default)]
struct CredentialRows {
    by_id: HashMap<Uuid, RefreshCredential>,
    by_digest: HashMap<SecretDigest, Uuid>,
}

impl CredentialRows {
    fn get_by_digest(&self, digest: &SecretDigest) -> Option<&RefreshCredential> {
        let id = self.by_digest.get(digest)?;
        self.by_id.get(id)
    }

    fn get_by_digest_mut(&mut self, digest: &SecretDigest) -> Option<&mut RefreshCredential> {
        let id = self.by_digest.get(digest)?;
        self.by_id.get_mut(id)
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<CredentialRows>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held, revoked ones included.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: Uuid) -> Option<RefreshCredential> {
        self.rows.lock().await.by_id.get(&id).cloned()
    }

    /// All rows owned by `owner_id`, oldest first.
    pub async fn for_owner(&self, owner_id: Uuid) -> Vec<RefreshCredential> {
        let rows = self.rows.lock().await;
        let mut owned: Vec<RefreshCredential> = rows
            .by_id
            .values()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|row| row.id);
        owned
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, new: NewRefreshCredential) -> Result<RefreshCredential> {
        let mut rows = self.rows.lock().await;
        if rows.by_digest.contains_key(&new.digest) {
            bail!("refresh credential digest already exists");
        }
        if rows.by_id.contains_key(&new.id) {
            bail!("refresh credential id already exists");
        }

        let credential = RefreshCredential {
            id: new.id,
            owner_id: new.owner_id,
            digest: new.digest,
            expires_at: new.expires_at,
            revoked: false,
            last_used_at: None,
            created_at: new.created_at,
        };
        rows.by_digest.insert(credential.digest, credential.id);
        rows.by_id.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn find_active(
        &self,
        digest: &SecretDigest,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshCredential>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get_by_digest(digest)
            .filter(|row| row.is_active(now))
            .cloned())
    }

    async fn consume(&self, digest: &SecretDigest, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.get_by_digest_mut(digest) else {
            return Ok(ConsumeOutcome::NotFound);
        };

        if row.revoked {
            return Ok(ConsumeOutcome::AlreadyRevoked {
                owner_id: row.owner_id,
            });
        }
        if row.expires_at <= now {
            return Ok(ConsumeOutcome::Expired);
        }

        row.revoked = true;
        row.last_used_at = Some(now);
        Ok(ConsumeOutcome::Consumed(row.clone()))
    }

    async fn revoke(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().await;
        match rows.by_id.get_mut(&id) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_owner(&self, owner_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut changed = 0;
        for row in rows
            .by_id
            .values_mut()
            .filter(|row| row.owner_id == owner_id && !row.revoked)
        {
            row.revoked = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        if let Some(row) = self.rows.lock().await.by_id.get_mut(&id) {
            row.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let expired: Vec<(Uuid, SecretDigest)> = rows
            .by_id
            .values()
            .filter(|row| row.expires_at <= now)
            .map(|row| (row.id, row.digest))
            .collect();

        for (id, digest) in &expired {
            rows.by_id.remove(id);
            rows.by_digest.remove(digest);
        }
        Ok(expired.len() as u64)
    }
}

/// Principals keyed by normalized email.
#[derive(Default)]
pub struct MemoryPrincipalDirectory {
    records: Mutex<HashMap<String, PrincipalRecord>>,
}

impl MemoryPrincipalDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a principal, as if the account had been deleted out of band.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| record.principal.id != id);
        records.len() != before
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>> {
        Ok(self.records.lock().await.get(email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|record| record.principal.id == id)
            .map(|record| record.principal.clone()))
    }

    async fn create(&self, new: NewPrincipal) -> Result<CreateOutcome> {
        let mut records = self.records.lock().await;
        if records.contains_key(&new.email) {
            return Ok(CreateOutcome::Conflict);
        }

        let principal = Principal {
            id: Uuid::now_v7(),
            name: new.name,
            email: new.email.clone(),
            role: new.role,
        };
        records.insert(
            new.email,
            PrincipalRecord {
                principal: principal.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(CreateOutcome::Created(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::principal::Role;
    use chrono::Duration;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap_or_default()
    }

    async fn seeded(
        store: &MemoryCredentialStore,
        secret: &str,
        owner: Uuid,
    ) -> Result<RefreshCredential> {
        store
            .insert(NewRefreshCredential::new(
                owner,
                SecretDigest::of(secret),
                at(0) + Duration::days(7),
                at(0),
            ))
            .await
    }

    #[tokio::test]
    async fn duplicate_digest_is_refused() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let owner = Uuid::now_v7();
        seeded(&store, "one", owner).await?;
        assert!(seeded(&store, "one", owner).await.is_err());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn consume_is_single_use() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let owner = Uuid::now_v7();
        let row = seeded(&store, "one", owner).await?;
        let digest = SecretDigest::of("one");

        let ConsumeOutcome::Consumed(consumed) = store.consume(&digest, at(60)).await? else {
            anyhow::bail!("first consume should win");
        };
        assert_eq!(consumed.id, row.id);
        assert!(consumed.revoked);
        assert_eq!(consumed.last_used_at, Some(at(60)));

        assert_eq!(
            store.consume(&digest, at(61)).await?,
            ConsumeOutcome::AlreadyRevoked { owner_id: owner }
        );
        Ok(())
    }

    #[tokio::test]
    async fn consume_reports_expired_and_missing() -> Result<()> {
        let store = MemoryCredentialStore::new();
        seeded(&store, "one", Uuid::now_v7()).await?;
        let expiry = at(0) + Duration::days(7);

        assert_eq!(
            store.consume(&SecretDigest::of("one"), expiry).await?,
            ConsumeOutcome::Expired
        );
        assert_eq!(
            store.consume(&SecretDigest::of("never"), at(0)).await?,
            ConsumeOutcome::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn find_active_skips_revoked_and_expired() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let row = seeded(&store, "one", Uuid::now_v7()).await?;
        let digest = SecretDigest::of("one");

        assert!(store.find_active(&digest, at(1)).await?.is_some());
        assert!(store
            .find_active(&digest, at(0) + Duration::days(8))
            .await?
            .is_none());

        assert!(store.revoke(row.id).await?);
        assert!(!store.revoke(row.id).await?);
        assert!(store.find_active(&digest, at(1)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_only_touches_owner() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let owner = Uuid::now_v7();
        let other = Uuid::now_v7();
        seeded(&store, "a", owner).await?;
        seeded(&store, "b", owner).await?;
        seeded(&store, "c", other).await?;

        assert_eq!(store.revoke_all_for_owner(owner).await?, 2);
        assert_eq!(store.revoke_all_for_owner(owner).await?, 0);
        assert!(store.for_owner(owner).await.iter().all(|row| row.revoked));
        assert!(store.for_owner(other).await.iter().all(|row| !row.revoked));
        Ok(())
    }

    #[tokio::test]
    async fn touch_stamps_last_used() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let row = seeded(&store, "one", Uuid::now_v7()).await?;
        store.touch(row.id, at(30)).await?;
        assert_eq!(
            store.get(row.id).await.and_then(|row| row.last_used_at),
            Some(at(30))
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_expired_removes_rows_and_digests() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let owner = Uuid::now_v7();
        seeded(&store, "old", owner).await?;
        store
            .insert(NewRefreshCredential::new(
                owner,
                SecretDigest::of("young"),
                at(0) + Duration::days(30),
                at(0),
            ))
            .await?;

        assert_eq!(store.delete_expired(at(0) + Duration::days(7)).await?, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.consume(&SecretDigest::of("old"), at(0)).await?,
            ConsumeOutcome::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn directory_rejects_duplicate_email() -> Result<()> {
        let directory = MemoryPrincipalDirectory::new();
        let new = NewPrincipal {
            name: "Cook".to_string(),
            email: "cook@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::RegularUser,
        };

        let CreateOutcome::Created(principal) = directory.create(new.clone()).await? else {
            anyhow::bail!("first create should succeed");
        };
        assert!(matches!(
            directory.create(new).await?,
            CreateOutcome::Conflict
        ));

        assert_eq!(
            directory.find_by_id(principal.id).await?,
            Some(principal.clone())
        );
        assert!(directory.find_by_email("cook@example.com").await?.is_some());
        assert!(directory.remove(principal.id).await);
        assert!(directory.find_by_id(principal.id).await?.is_none());
        Ok(())
    }
}
