//! # Feed State Repository
//!
//! Per-feed bookkeeping: which feeds exist, their report codes, and when each
//! last synchronized successfully. Incremental feeds read their
//! `last_success_at` back as the `tarihsaat` fetch parameter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Stored state of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct FeedState {
    pub code: String,
    pub report_code: String,
    pub title: String,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Repository for feed state.
#[derive(Debug, Clone)]
pub struct FeedStateRepository {
    pool: SqlitePool,
}

impl FeedStateRepository {
    /// Creates a new FeedStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FeedStateRepository { pool }
    }

    /// Registers a feed, refreshing its report code and title. The last
    /// success timestamp is preserved.
    pub async fn register(&self, code: &str, report_code: &str, title: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO integration_feed (code, report_code, title, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(code) DO UPDATE SET
                report_code = excluded.report_code,
                title = excluded.title,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(code)
        .bind(report_code)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Last successful synchronization of a feed.
    pub async fn last_success(&self, code: &str) -> DbResult<Option<DateTime<Utc>>> {
        let value: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT last_success_at FROM integration_feed WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }

    /// Records a successful synchronization.
    pub async fn record_success(&self, code: &str, at: DateTime<Utc>) -> DbResult<()> {
        debug!(code = %code, at = %at, "Recording feed success");

        sqlx::query(
            r#"
            UPDATE integration_feed SET
                last_success_at = ?2,
                updated_at = ?2
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All registered feeds, ordered by code.
    pub async fn list(&self) -> DbResult<Vec<FeedState>> {
        let feeds = sqlx::query_as::<_, FeedState>(
            r#"
            SELECT code, report_code, title, last_success_at
            FROM integration_feed
            ORDER BY code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }
}
