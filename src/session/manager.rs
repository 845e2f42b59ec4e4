//! Session lifecycle: registration, login, refresh rotation with reuse
//! detection, logout, and access token verification.
//!
//! The manager keeps no mutable state of its own. Every operation reads the
//! clock once and uses that instant for all of its expiry decisions; the only
//! mutual exclusion it relies on is [`CredentialStore::consume`].

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    codec::{AccessClaims, AccessTokenCodec},
    config::SessionConfig,
    error::SessionError,
    password::{Argon2Passwords, PasswordHasher},
    principal::{
        normalize_email, valid_email, CreateOutcome, NewPrincipal, Principal, PrincipalDirectory,
        Role,
    },
    secret::{digest_secret, generate_refresh_secret, SecretDigest},
    store::{ConsumeOutcome, CredentialStore, NewRefreshCredential},
};

/// A freshly issued token pair.
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_secret: SecretString,
    pub refresh_expires_at: DateTime<Utc>,
    /// Clock reading the pair was issued at.
    pub issued_at: DateTime<Utc>,
    pub principal: Principal,
}

impl IssuedSession {
    /// Seconds until the refresh credential expires, measured from `issued_at`.
    #[must_use]
    pub fn refresh_max_age_seconds(&self) -> i64 {
        (self.refresh_expires_at - self.issued_at).num_seconds().max(0)
    }
}

impl fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedSession")
            .field("access_token", &"***")
            .field("refresh_secret", &"***")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("issued_at", &self.issued_at)
            .field("principal", &self.principal)
            .finish()
    }
}

pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    principals: Arc<dyn PrincipalDirectory>,
    passwords: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    codec: AccessTokenCodec,
    refresh_ttl: chrono::Duration,
    config: SessionConfig,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build a manager with Argon2id password hashing and the system clock.
    ///
    /// # Errors
    /// Returns an error if the signing key is empty or a TTL is out of range.
    pub fn new(
        signing_key: SecretString,
        config: SessionConfig,
        credentials: Arc<dyn CredentialStore>,
        principals: Arc<dyn PrincipalDirectory>,
    ) -> anyhow::Result<Self> {
        let codec = AccessTokenCodec::new(signing_key, config.access_ttl())
            .context("invalid access token settings")?;
        let refresh_ttl = chrono::Duration::from_std(config.refresh_ttl())
            .context("refresh ttl out of range")?;

        Ok(Self {
            credentials,
            principals,
            passwords: Arc::new(Argon2Passwords::default()),
            clock: Arc::new(SystemClock),
            codec,
            refresh_ttl,
            config,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_password_hasher(mut self, passwords: Arc<dyn PasswordHasher>) -> Self {
        self.passwords = passwords;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a principal and log it in.
    ///
    /// # Errors
    /// `InvalidInput` for an empty name or password or a malformed email,
    /// `AlreadyExists` when the email is taken, `Internal` on collaborator failure.
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<IssuedSession, SessionError> {
        self.register_with_role(name, email, password, Role::RegularUser)
            .await
    }

    /// Same as [`Self::register`] with an explicit role, for provisioning admins.
    ///
    /// # Errors
    /// See [`Self::register`].
    #[instrument(skip_all, fields(role = %role))]
    pub async fn register_with_role(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();

        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("name is required".to_string()));
        }
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(SessionError::InvalidInput("email is invalid".to_string()));
        }
        if password.is_empty() {
            return Err(SessionError::InvalidInput(
                "password is required".to_string(),
            ));
        }

        // Skip the expensive hash when the conflict is already visible; the
        // unique constraint still decides races.
        if self.principals.find_by_email(&email).await?.is_some() {
            return Err(SessionError::AlreadyExists);
        }

        let password_hash = self.hash_password(password).await?;
        let outcome = self
            .principals
            .create(NewPrincipal {
                name: name.to_string(),
                email,
                password_hash,
                role,
            })
            .await?;

        match outcome {
            CreateOutcome::Created(principal) => {
                info!(principal_id = %principal.id, "principal registered");
                self.issue_at(&principal, now).await
            }
            CreateOutcome::Conflict => Err(SessionError::AlreadyExists),
        }
    }

    /// Verify credentials and issue a token pair.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email or a wrong password, with no
    /// way to tell the two apart.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();
        let email = normalize_email(email);

        let Some(record) = self.principals.find_by_email(&email).await? else {
            debug!("login for unknown email");
            // Pay the same hashing cost as a wrong password.
            self.hash_password(password).await?;
            return Err(SessionError::InvalidCredentials);
        };

        if !self
            .verify_password(password, record.password_hash.clone())
            .await?
        {
            debug!(principal_id = %record.principal.id, "login with wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        self.issue_at(&record.principal, now).await
    }

    /// Issue a token pair for an already-authenticated principal, e.g. one
    /// resolved by an external identity provider.
    ///
    /// # Errors
    /// `Internal` if signing or persisting fails.
    pub async fn issue_session(&self, principal: &Principal) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();
        self.issue_at(principal, now).await
    }

    /// Exchange a refresh secret for a new pair. The presented secret is spent
    /// whatever happens next.
    ///
    /// Presenting a secret that was already spent revokes every credential of
    /// its owner before `ReuseDetected` is returned.
    ///
    /// # Errors
    /// `InvalidOrExpired`, `ReuseDetected`, or `Internal`.
    #[instrument(skip_all)]
    pub async fn rotate(&self, presented: &str) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();
        if presented.is_empty() {
            return Err(SessionError::InvalidOrExpired);
        }
        let digest = SecretDigest::of(presented);

        let consumed = match self.credentials.consume(&digest, now).await? {
            ConsumeOutcome::Consumed(credential) => credential,
            ConsumeOutcome::AlreadyRevoked { owner_id } => {
                warn!(
                    principal_id = %owner_id,
                    "refresh token reuse detected, revoking all sessions"
                );
                let revoked = self.credentials.revoke_all_for_owner(owner_id).await?;
                info!(principal_id = %owner_id, revoked, "sessions revoked after reuse");
                return Err(SessionError::ReuseDetected);
            }
            ConsumeOutcome::Expired | ConsumeOutcome::NotFound => {
                return Err(SessionError::InvalidOrExpired);
            }
        };

        let Some(principal) = self.principals.find_by_id(consumed.owner_id).await? else {
            warn!(principal_id = %consumed.owner_id, "refresh credential owner no longer exists");
            return Err(SessionError::InvalidOrExpired);
        };

        let access_token = self.sign(&principal, now)?;
        let refresh_secret = generate_refresh_secret()?;
        // The replacement keeps the original deadline; sessions cannot be
        // extended past their login-time lifetime.
        let replacement = self
            .credentials
            .insert(NewRefreshCredential::new(
                principal.id,
                digest_secret(&refresh_secret),
                consumed.expires_at,
                now,
            ))
            .await?;

        debug!(
            principal_id = %principal.id,
            previous = %consumed.id,
            credential_id = %replacement.id,
            "refresh credential rotated"
        );

        Ok(IssuedSession {
            access_token,
            refresh_secret,
            refresh_expires_at: replacement.expires_at,
            issued_at: now,
            principal,
        })
    }

    /// Revoke the credential behind `presented`, if it is still active.
    /// Unknown, expired or already revoked secrets are not an error.
    ///
    /// # Errors
    /// `Internal` on store failure.
    #[instrument(skip_all)]
    pub async fn logout(&self, presented: &str) -> Result<(), SessionError> {
        let now = self.clock.now();
        if presented.is_empty() {
            return Ok(());
        }

        if let Some(active) = self
            .credentials
            .find_active(&SecretDigest::of(presented), now)
            .await?
        {
            self.credentials.revoke(active.id).await?;
            debug!(principal_id = %active.owner_id, credential_id = %active.id, "logged out");
        }
        Ok(())
    }

    /// Revoke every credential of `principal_id`; returns how many were active.
    ///
    /// # Errors
    /// `Internal` on store failure.
    #[instrument(skip(self))]
    pub async fn logout_all(&self, principal_id: Uuid) -> Result<u64, SessionError> {
        let revoked = self.credentials.revoke_all_for_owner(principal_id).await?;
        info!(revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Check an access token's signature and expiry. Never touches storage.
    ///
    /// # Errors
    /// `InvalidToken` for any verification failure.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, SessionError> {
        self.codec
            .verify(token, self.clock.now())
            .map_err(|err| {
                debug!("access token rejected: {err}");
                SessionError::InvalidToken
            })
    }

    /// Delete credentials whose expiry has passed.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub async fn sweep_expired(&self) -> Result<u64, SessionError> {
        let now = self.clock.now();
        Ok(self.credentials.delete_expired(now).await?)
    }

    async fn issue_at(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let expires_at = now
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| anyhow!("refresh expiry out of range"))?;
        let access_token = self.sign(principal, now)?;
        let refresh_secret = generate_refresh_secret()?;
        let credential = self
            .credentials
            .insert(NewRefreshCredential::new(
                principal.id,
                digest_secret(&refresh_secret),
                expires_at,
                now,
            ))
            .await?;

        debug!(
            principal_id = %principal.id,
            credential_id = %credential.id,
            "session issued"
        );

        Ok(IssuedSession {
            access_token,
            refresh_secret,
            refresh_expires_at: credential.expires_at,
            issued_at: now,
            principal: principal.clone(),
        })
    }

    fn sign(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, SessionError> {
        self.codec
            .issue(principal, now)
            .map_err(|err| SessionError::Internal(anyhow!(err).context("failed to sign access token")))
    }

    async fn hash_password(&self, password: &str) -> Result<String, SessionError> {
        let passwords = Arc::clone(&self.passwords);
        let password = SecretString::from(password.to_string());
        let hash = tokio::task::spawn_blocking(move || passwords.hash(password.expose_secret()))
            .await
            .context("password hashing task failed")??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: String) -> Result<bool, SessionError> {
        let passwords = Arc::clone(&self.passwords);
        let password = SecretString::from(password.to_string());
        let verified =
            tokio::task::spawn_blocking(move || passwords.verify(password.expose_secret(), &hash))
                .await
                .context("password verification task failed")?;
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        clock::ManualClock,
        memory::{MemoryCredentialStore, MemoryPrincipalDirectory},
    };
    use anyhow::Result;
    use chrono::Duration;

    struct Fixture {
        manager: SessionManager,
        store: Arc<MemoryCredentialStore>,
        directory: Arc<MemoryPrincipalDirectory>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Result<Fixture> {
        let store = Arc::new(MemoryCredentialStore::new());
        let directory = Arc::new(MemoryPrincipalDirectory::new());
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        ));
        let manager = SessionManager::new(
            SecretString::from("test-signing-key".to_string()),
            SessionConfig::new(),
            store.clone(),
            directory.clone(),
        )?
        .with_clock(clock.clone())
        .with_password_hasher(Arc::new(Argon2Passwords::insecure_fast()));
        Ok(Fixture {
            manager,
            store,
            directory,
            clock,
        })
    }

    #[tokio::test]
    async fn register_validates_input() -> Result<()> {
        let fx = fixture()?;
        for (name, email, password) in [
            (" ", "cook@example.com", "pw"),
            ("Cook", "not-an-email", "pw"),
            ("Cook", "cook@example.com", ""),
        ] {
            assert!(matches!(
                fx.manager.register(name, email, password).await,
                Err(SessionError::InvalidInput(_))
            ));
        }
        assert!(fx.store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn register_normalizes_email_and_rejects_duplicates() -> Result<()> {
        let fx = fixture()?;
        let issued = fx
            .manager
            .register("Cook", " Cook@Example.com ", "pw")
            .await?;
        assert_eq!(issued.principal.email, "cook@example.com");
        assert_eq!(issued.principal.role, Role::RegularUser);
        assert_eq!(
            issued.refresh_expires_at,
            fx.clock.now() + Duration::days(7)
        );

        assert!(matches!(
            fx.manager.register("Other", "cook@example.com", "pw2").await,
            Err(SessionError::AlreadyExists)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() -> Result<()> {
        let fx = fixture()?;
        fx.manager.register("Cook", "cook@example.com", "pw").await?;

        let unknown = fx.manager.login("nobody@example.com", "pw").await;
        let wrong = fx.manager.login("cook@example.com", "nope").await;
        match (unknown, wrong) {
            (Err(a), Err(b)) => {
                assert!(matches!(a, SessionError::InvalidCredentials));
                assert!(matches!(b, SessionError::InvalidCredentials));
                assert_eq!(a.to_string(), b.to_string());
            }
            _ => anyhow::bail!("both logins should fail"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_still_runs_the_hasher() -> Result<()> {
        struct Counting {
            inner: Argon2Passwords,
            calls: std::sync::atomic::AtomicUsize,
        }

        impl PasswordHasher for Counting {
            fn hash(&self, password: &str) -> anyhow::Result<String> {
                self.calls
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                self.inner.hash(password)
            }

            fn verify(&self, password: &str, hash: &str) -> bool {
                self.calls
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                self.inner.verify(password, hash)
            }
        }

        let counting = Arc::new(Counting {
            inner: Argon2Passwords::insecure_fast(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let manager = SessionManager::new(
            SecretString::from("test-signing-key".to_string()),
            SessionConfig::new(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryPrincipalDirectory::new()),
        )?
        .with_password_hasher(counting.clone());

        assert!(matches!(
            manager.login("nobody@example.com", "pw").await,
            Err(SessionError::InvalidCredentials)
        ));
        assert_eq!(counting.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_ttl_past_the_date_range_is_an_error() -> Result<()> {
        let manager = SessionManager::new(
            SecretString::from("test-signing-key".to_string()),
            SessionConfig::new()
                .with_refresh_ttl(std::time::Duration::from_secs(8_640_000_000_000)),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryPrincipalDirectory::new()),
        )?
        .with_password_hasher(Arc::new(Argon2Passwords::insecure_fast()));

        assert!(matches!(
            manager.register("Cook", "cook@example.com", "pw").await,
            Err(SessionError::Internal(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn access_token_carries_principal() -> Result<()> {
        let fx = fixture()?;
        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        let claims = fx.manager.verify_access_token(&issued.access_token)?;
        assert_eq!(claims.sub, issued.principal.id);
        assert_eq!(claims.role, Role::RegularUser);

        fx.clock.advance(Duration::minutes(15));
        assert!(matches!(
            fx.manager.verify_access_token(&issued.access_token),
            Err(SessionError::InvalidToken)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rotate_keeps_original_deadline() -> Result<()> {
        let fx = fixture()?;
        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        fx.clock.advance(Duration::days(3));

        let rotated = fx
            .manager
            .rotate(issued.refresh_secret.expose_secret())
            .await?;
        assert_eq!(rotated.refresh_expires_at, issued.refresh_expires_at);
        assert_eq!(rotated.issued_at, fx.clock.now());
        assert_eq!(
            issued.refresh_max_age_seconds(),
            Duration::days(7).num_seconds()
        );
        assert_eq!(
            rotated.refresh_max_age_seconds(),
            Duration::days(4).num_seconds()
        );
        assert_ne!(
            rotated.refresh_secret.expose_secret(),
            issued.refresh_secret.expose_secret()
        );
        Ok(())
    }

    #[tokio::test]
    async fn rotate_rejects_unknown_and_expired() -> Result<()> {
        let fx = fixture()?;
        assert!(matches!(
            fx.manager.rotate("never-issued").await,
            Err(SessionError::InvalidOrExpired)
        ));
        assert!(matches!(
            fx.manager.rotate("").await,
            Err(SessionError::InvalidOrExpired)
        ));

        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        fx.clock.advance(Duration::days(7));
        assert!(matches!(
            fx.manager.rotate(issued.refresh_secret.expose_secret()).await,
            Err(SessionError::InvalidOrExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn replay_revokes_every_session() -> Result<()> {
        let fx = fixture()?;
        let first = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        let second = fx.manager.login("cook@example.com", "pw").await?;

        let rotated = fx
            .manager
            .rotate(first.refresh_secret.expose_secret())
            .await?;
        assert!(matches!(
            fx.manager.rotate(first.refresh_secret.expose_secret()).await,
            Err(SessionError::ReuseDetected)
        ));

        for secret in [&rotated.refresh_secret, &second.refresh_secret] {
            assert!(matches!(
                fx.manager.rotate(secret.expose_secret()).await,
                Err(SessionError::ReuseDetected)
            ));
        }
        let owned = fx.store.for_owner(first.principal.id).await;
        assert_eq!(owned.len(), 3);
        assert!(owned.iter().all(|row| row.revoked));
        Ok(())
    }

    #[tokio::test]
    async fn rotate_for_vanished_owner_is_invalid() -> Result<()> {
        let fx = fixture()?;
        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        assert!(fx.directory.remove(issued.principal.id).await);
        assert!(matches!(
            fx.manager.rotate(issued.refresh_secret.expose_secret()).await,
            Err(SessionError::InvalidOrExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn logout_is_idempotent() -> Result<()> {
        let fx = fixture()?;
        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        let secret = issued.refresh_secret.expose_secret();

        fx.manager.logout(secret).await?;
        fx.manager.logout(secret).await?;
        fx.manager.logout("unknown").await?;
        fx.manager.logout("").await?;

        // A logged-out secret counts as spent.
        assert!(matches!(
            fx.manager.rotate(secret).await,
            Err(SessionError::ReuseDetected)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn logout_all_counts_active_sessions() -> Result<()> {
        let fx = fixture()?;
        let issued = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        fx.manager.login("cook@example.com", "pw").await?;
        assert_eq!(fx.manager.logout_all(issued.principal.id).await?, 2);
        assert_eq!(fx.manager.logout_all(issued.principal.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn issue_session_for_linked_principal() -> Result<()> {
        let fx = fixture()?;
        let registered = fx.manager.register("Cook", "cook@example.com", "pw").await?;
        let issued = fx.manager.issue_session(&registered.principal).await?;
        assert_eq!(issued.principal, registered.principal);
        assert_eq!(fx.store.for_owner(registered.principal.id).await.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() -> Result<()> {
        let fx = fixture()?;
        fx.manager.register("Cook", "cook@example.com", "pw").await?;
        fx.clock.advance(Duration::days(6));
        fx.manager.login("cook@example.com", "pw").await?;

        assert_eq!(fx.manager.sweep_expired().await?, 0);
        fx.clock.advance(Duration::days(1));
        assert_eq!(fx.manager.sweep_expired().await?, 1);
        assert_eq!(fx.store.len().await, 1);
        Ok(())
    }

    #[test]
    fn issued_session_debug_hides_tokens() {
        let issued = IssuedSession {
            access_token: "header.claims.signature".to_string(),
            refresh_secret: SecretString::from("raw-secret".to_string()),
            refresh_expires_at: Utc::now(),
            issued_at: Utc::now(),
            principal: Principal {
                id: Uuid::nil(),
                name: "Cook".to_string(),
                email: "cook@example.com".to_string(),
                role: Role::RegularUser,
            },
        };
        let rendered = format!("{issued:?}");
        assert!(!rendered.contains("raw-secret"));
        assert!(!rendered.contains("signature"));
    }
}
