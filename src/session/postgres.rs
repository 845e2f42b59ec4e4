//! Postgres implementations of the storage collaborators.
//!
//! Every statement runs inside a `db.query` span carrying the SQL text.
//! Rotation relies on a single conditional `UPDATE ... RETURNING`; the row
//! lock taken by that statement serializes concurrent consumers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::principal::{
    CreateOutcome, NewPrincipal, Principal, PrincipalDirectory, PrincipalRecord, Role,
};
use super::secret::SecretDigest;
use super::store::{ConsumeOutcome, CredentialStore, NewRefreshCredential, RefreshCredential};

/// Idempotent schema applied at startup.
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");

const CREDENTIAL_COLUMNS: &str =
    "id, owner_id, token_hash, expires_at, revoked, last_used_at, created_at";

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Create tables and indexes if they do not exist yet.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .instrument(db_span("DDL", "schema.sql"))
        .await
        .context("failed to apply database schema")?;
    Ok(())
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> Result<RefreshCredential> {
    let token_hash: Vec<u8> = row.try_get("token_hash")?;
    Ok(RefreshCredential {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        digest: SecretDigest::from_slice(&token_hash)?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
        last_used_at: row.try_get("last_used_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, new: NewRefreshCredential) -> Result<RefreshCredential> {
        let query = format!(
            "INSERT INTO refresh_credentials (id, owner_id, token_hash, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {CREDENTIAL_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new.id)
            .bind(new.owner_id)
            .bind(new.digest.as_bytes())
            .bind(new.expires_at)
            .bind(new.created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to insert refresh credential")?;
        credential_from_row(&row)
    }

    async fn find_active(
        &self,
        digest: &SecretDigest,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshCredential>> {
        let query = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM refresh_credentials \
             WHERE token_hash = $1 AND revoked = FALSE AND expires_at > $2"
        );
        let row = sqlx::query(&query)
            .bind(digest.as_bytes())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to look up refresh credential")?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn consume(&self, digest: &SecretDigest, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let query = format!(
            "UPDATE refresh_credentials SET revoked = TRUE, last_used_at = $2 \
             WHERE token_hash = $1 AND revoked = FALSE AND expires_at > $2 \
             RETURNING {CREDENTIAL_COLUMNS}"
        );
        let consumed = sqlx::query(&query)
            .bind(digest.as_bytes())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to consume refresh credential")?;
        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(credential_from_row(&row)?));
        }

        // Nothing was active; classify what is there. A row revoked here can
        // only move further away from active, so this read cannot misreport.
        let query = "SELECT owner_id, revoked FROM refresh_credentials WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(digest.as_bytes())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to classify refresh credential")?;

        Ok(match row {
            None => ConsumeOutcome::NotFound,
            Some(row) if row.try_get::<bool, _>("revoked")? => ConsumeOutcome::AlreadyRevoked {
                owner_id: row.try_get("owner_id")?,
            },
            Some(_) => ConsumeOutcome::Expired,
        })
    }

    async fn revoke(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE refresh_credentials SET revoked = TRUE WHERE id = $1 AND revoked = FALSE";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh credential")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_owner(&self, owner_id: Uuid) -> Result<u64> {
        let query =
            "UPDATE refresh_credentials SET revoked = TRUE WHERE owner_id = $1 AND revoked = FALSE";
        let result = sqlx::query(query)
            .bind(owner_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh credentials for owner")?;
        Ok(result.rows_affected())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE refresh_credentials SET last_used_at = $2 WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to touch refresh credential")?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM refresh_credentials WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete expired refresh credentials")?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone, Debug)]
pub struct PgPrincipalDirectory {
    pool: PgPool,
}

impl PgPrincipalDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn principal_from_row(row: &sqlx::postgres::PgRow) -> Result<Principal> {
    let role: String = row.try_get("role")?;
    Ok(Principal {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role.parse::<Role>().map_err(anyhow::Error::msg)?,
    })
}

#[async_trait]
impl PrincipalDirectory for PgPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>> {
        let query = "SELECT id, name, email, role, password_hash FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to look up user by email")?;

        row.map(|row| {
            Ok(PrincipalRecord {
                principal: principal_from_row(&row)?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let query = "SELECT id, name, email, role FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to look up user by id")?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn create(&self, new: NewPrincipal) -> Result<CreateOutcome> {
        let query = r"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, role
        ";
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(row) => Ok(CreateOutcome::Created(principal_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }
}
