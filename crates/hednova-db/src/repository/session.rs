//! # Session Store
//!
//! Persists the single active session token, keyed by a fixed integration
//! code. Every refresh overwrites the row; it is never deleted.
//!
//! No expiry is enforced here. A stale token surfaces as a rejected fetch,
//! which the orchestrator answers by re-authenticating.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use hednova_core::{token_preview, Session};

/// Integration code of the session row.
pub const SESSION_CODE: &str = "ENT-01";

/// Repository for the active session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Creates a new SessionStore.
    pub fn new(pool: SqlitePool) -> Self {
        SessionStore { pool }
    }

    /// Returns the stored session, or `None` when no usable token exists.
    pub async fn active_session(&self) -> DbResult<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT token, issued_at
            FROM integration_session
            WHERE code = ?1
            "#,
        )
        .bind(SESSION_CODE)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token: Option<String> = row.try_get("token")?;
        let issued_at: Option<DateTime<Utc>> = row.try_get("issued_at")?;

        Ok(token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|token| Session {
                token,
                issued_at: issued_at.unwrap_or_default(),
            }))
    }

    /// Returns the active token, or `None` when the store is empty or the
    /// token is blank.
    pub async fn get_active_token(&self) -> DbResult<Option<String>> {
        Ok(self.active_session().await?.map(|s| s.token))
    }

    /// Upserts the session row.
    pub async fn set_token(&self, token: &str, issued_at: DateTime<Utc>) -> DbResult<()> {
        debug!(token = %token_preview(token), %issued_at, "Storing session token");

        sqlx::query(
            r#"
            INSERT INTO integration_session (code, token, issued_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(code) DO UPDATE SET
                token = excluded.token,
                issued_at = excluded.issued_at
            "#,
        )
        .bind(SESSION_CODE)
        .bind(token)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a freshly issued session.
    pub async fn store(&self, session: &Session) -> DbResult<()> {
        self.set_token(&session.token, session.issued_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    async fn store() -> SessionStore {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .session_store()
    }

    #[tokio::test]
    async fn test_empty_store_has_no_token() {
        let store = store().await;
        assert_eq!(store.get_active_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_token_overwrites() {
        let store = store().await;
        let t1 = Utc::now();
        let t2 = t1 + Duration::minutes(30);

        store.set_token("T1", t1).await.unwrap();
        assert_eq!(store.get_active_token().await.unwrap(), Some("T1".to_string()));

        store.set_token("T2", t2).await.unwrap();
        assert_eq!(store.get_active_token().await.unwrap(), Some("T2".to_string()));

        let session = store.active_session().await.unwrap().unwrap();
        assert_eq!(session.issued_at.timestamp(), t2.timestamp());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM integration_session")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_blank_token_is_not_usable() {
        let store = store().await;
        store.set_token("  ", Utc::now()).await.unwrap();
        assert_eq!(store.get_active_token().await.unwrap(), None);
    }
}
