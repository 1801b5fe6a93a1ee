//! Database operations for `wizard_sessions`.
//!
//! The full session is stored as JSONB in `body`; `state`, `revision`,
//! `list_id` and `expires_at` are mirrored into columns so the open-session
//! uniqueness index, the conditional update and the purge can run in SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flyerwise_wizard::{SessionStore, StoreError, WizardSession};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{is_unique_violation, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `wizard_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub list_id: Uuid,
    pub state: String,
    pub revision: i64,
    pub dataset_version: i64,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    /// Decodes `body`. The `revision` column wins over the copy in the body.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if `body` is not a valid session.
    pub fn into_session(self) -> Result<WizardSession, DbError> {
        let mut session: WizardSession = serde_json::from_value(self.body)?;
        session.revision = self.revision;
        Ok(session)
    }
}

const SESSION_COLUMNS: &str =
    "id, list_id, state, revision, dataset_version, body, created_at, expires_at, updated_at";

// ---------------------------------------------------------------------------
// wizard_sessions operations
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::Serialization`] if the stored body cannot be decoded.
pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<Option<WizardSession>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM wizard_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(SessionRow::into_session).transpose()
}

/// The list's session in `initialized`, `in_progress` or `reviewing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::Serialization`] if the stored body cannot be decoded.
pub async fn get_open_session_for_list(
    pool: &PgPool,
    list_id: Uuid,
) -> Result<Option<WizardSession>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM wizard_sessions \
         WHERE list_id = $1 AND state IN ('initialized', 'in_progress', 'reviewing') \
         LIMIT 1"
    ))
    .bind(list_id)
    .fetch_optional(pool)
    .await?;
    row.map(SessionRow::into_session).transpose()
}

/// Inserts a new session.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the id is taken or the list already has
/// an open session, [`DbError::Serialization`] if the session cannot be
/// encoded, or [`DbError::Sqlx`] for any other failure.
pub async fn insert_session(pool: &PgPool, session: &WizardSession) -> Result<(), DbError> {
    let body = serde_json::to_value(session)?;
    sqlx::query(
        "INSERT INTO wizard_sessions \
             (id, list_id, state, revision, dataset_version, body, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(session.id)
    .bind(session.list_id)
    .bind(session.state.as_str())
    .bind(session.revision)
    .bind(session.dataset_version)
    .bind(body)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            DbError::Conflict
        } else {
            DbError::Sqlx(e)
        }
    })?;
    Ok(())
}

/// Overwrites a session if its stored revision still equals
/// `expected_revision`.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if another writer got there first,
/// [`DbError::NotFound`] if the session no longer exists, or
/// [`DbError::Sqlx`] / [`DbError::Serialization`] on failure.
pub async fn update_session(
    pool: &PgPool,
    session: &WizardSession,
    expected_revision: i64,
) -> Result<(), DbError> {
    let body = serde_json::to_value(session)?;
    let result = sqlx::query(
        "UPDATE wizard_sessions SET \
             state           = $3, \
             revision        = $4, \
             dataset_version = $5, \
             body            = $6, \
             expires_at      = $7, \
             updated_at      = NOW() \
         WHERE id = $1 AND revision = $2",
    )
    .bind(session.id)
    .bind(expected_revision)
    .bind(session.state.as_str())
    .bind(session.revision)
    .bind(session.dataset_version)
    .bind(body)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            DbError::Conflict
        } else {
            DbError::Sqlx(e)
        }
    })?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM wizard_sessions WHERE id = $1)",
    )
    .bind(session.id)
    .fetch_one(pool)
    .await?;

    if exists {
        tracing::debug!(session_id = %session.id, expected_revision, "session revision moved on");
        Err(DbError::Conflict)
    } else {
        Err(DbError::NotFound)
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_session(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM wizard_sessions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes sessions whose expiry lies at or before `now`. Completed sessions
/// stay until their expiry also lies at or before `completed_before`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_expired_sessions(
    pool: &PgPool,
    now: DateTime<Utc>,
    completed_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM wizard_sessions \
         WHERE (state <> 'completed' AND expires_at <= $1) OR expires_at <= $2",
    )
    .bind(now)
    .bind(completed_before)
    .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<WizardSession>, StoreError> {
        Ok(get_session(&self.pool, id).await?)
    }

    async fn find_active_for_list(
        &self,
        list_id: Uuid,
    ) -> Result<Option<WizardSession>, StoreError> {
        Ok(get_open_session_for_list(&self.pool, list_id).await?)
    }

    async fn insert(&self, session: &WizardSession) -> Result<(), StoreError> {
        Ok(insert_session(&self.pool, session).await?)
    }

    async fn save(&self, session: &WizardSession, expected_revision: i64) -> Result<(), StoreError> {
        Ok(update_session(&self.pool, session, expected_revision).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(delete_session(&self.pool, id).await?)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        completed_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(purge_expired_sessions(&self.pool, now, completed_before).await?)
    }
}
