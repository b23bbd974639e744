//! # Mirror Repository (Table Synchronizer)
//!
//! Converges one local table onto a remote snapshot, driven entirely by a
//! [`TableSpec`].
//!
//! ## One Synchronization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SINGLE TRANSACTION                               │
//! │                                                                         │
//! │  1. SELECT key columns FROM table [WHERE TRIM(partition) = ?]          │
//! │       │                                                                 │
//! │  2. NormalizedSnapshot::build(spec, rows)  (trim, coerce, drop empty)  │
//! │       │                                                                 │
//! │  3. snapshot.diff(local_keys)                                          │
//! │       │                                                                 │
//! │  4. INSERT  one row per to_insert key  (key + columns [+ partition])   │
//! │  5. UPDATE  one row per to_update key  (full column overwrite)         │
//! │  6. DELETE  one row per to_delete key  (skipped if !prune_missing)     │
//! │       │                                                                 │
//! │  7. COMMIT ─── any failure ──► ROLLBACK, zero counts                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are interpolated only after `TableSpec::validate` and are
//! always double-quoted. Every value is bound.

use std::collections::HashSet;

use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteQueryResult};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use hednova_core::{
    ColumnValue, KeySetDiff, NormalizedSnapshot, RecordKey, RemoteRow, SyncCounts, SyncResult,
    TableSpec,
};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Repository applying remote snapshots to mirror tables.
#[derive(Debug, Clone)]
pub struct MirrorRepository {
    pool: SqlitePool,
}

impl MirrorRepository {
    /// Creates a new MirrorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MirrorRepository { pool }
    }

    /// Synchronizes one table and reports the outcome.
    ///
    /// Never fails: errors are rolled back and returned as a failed
    /// [`SyncResult`] with zero counts.
    pub async fn synchronize(&self, spec: &TableSpec, rows: &[RemoteRow]) -> SyncResult {
        match self.try_synchronize(spec, rows).await {
            Ok(result) => result,
            Err(e) => {
                warn!(table = %spec.table, error = %e, "Table synchronization rolled back");
                SyncResult::failure(&spec.table, e.to_string())
            }
        }
    }

    /// Synchronizes one table, returning the error instead of folding it
    /// into the result.
    pub async fn try_synchronize(
        &self,
        spec: &TableSpec,
        rows: &[RemoteRow],
    ) -> DbResult<SyncResult> {
        spec.validate()?;

        let snapshot = NormalizedSnapshot::build(spec, rows);
        if snapshot.skipped() > 0 {
            debug!(
                table = %spec.table,
                skipped = snapshot.skipped(),
                "Dropped rows with empty key"
            );
        }
        if snapshot.duplicates() > 0 {
            warn!(
                table = %spec.table,
                duplicates = snapshot.duplicates(),
                "Snapshot repeats keys; last occurrence wins"
            );
        }

        let mut tx = self.pool.begin().await?;

        match apply(&mut *tx, spec, &snapshot).await {
            Ok(counts) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::transaction(&spec.table, e))?;

                info!(
                    table = %spec.table,
                    inserted = counts.inserted,
                    updated = counts.updated,
                    deleted = counts.deleted,
                    skipped = snapshot.skipped(),
                    "Table synchronized"
                );
                Ok(SyncResult::success(&spec.table, counts, snapshot.skipped()))
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(table = %spec.table, error = %rollback, "Rollback failed");
                }
                Err(match e {
                    DbError::TransactionFailed { .. } => e,
                    other => DbError::transaction(&spec.table, other),
                })
            }
        }
    }

    /// Reads the local key set of a table (scoped by its partition).
    pub async fn local_keys(&self, spec: &TableSpec) -> DbResult<HashSet<RecordKey>> {
        spec.validate()?;
        let mut conn = self.pool.acquire().await?;
        read_local_keys(&mut *conn, spec).await
    }

    /// Number of rows in the table's partition.
    pub async fn count(&self, spec: &TableSpec) -> DbResult<i64> {
        spec.validate()?;

        let mut sql = format!("SELECT COUNT(*) FROM {}", quote(&spec.table));
        if let Some(partition) = &spec.partition {
            sql.push_str(&format!(" WHERE TRIM({}) = ?", quote(&partition.column)));
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(partition) = &spec.partition {
            query = query.bind(partition.value.clone());
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

// =============================================================================
// Transaction Body
// =============================================================================

async fn apply(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    snapshot: &NormalizedSnapshot,
) -> DbResult<SyncCounts> {
    let local = read_local_keys(conn, spec).await?;
    let mut plan: KeySetDiff<RecordKey> = snapshot.diff(&local);

    let disagreements = snapshot.marker_disagreements(&plan);
    if disagreements > 0 {
        debug!(
            table = %spec.table,
            disagreements,
            "Operation markers disagree with the computed plan; markers ignored"
        );
    }

    if !spec.prune_missing {
        plan.to_delete.clear();
    }

    let insert_sql = insert_statement(spec);
    let update_sql = update_statement(spec);
    let delete_sql = delete_statement(spec);

    let mut counts = SyncCounts::default();

    for key in &plan.to_insert {
        let Some(row) = snapshot.get(key) else { continue };
        let mut query = sqlx::query(&insert_sql);
        for part in key.parts() {
            query = query.bind(part.clone());
        }
        for value in &row.values {
            query = bind_value(query, value);
        }
        if let Some(partition) = &spec.partition {
            query = query.bind(partition.value.clone());
        }
        counts.inserted += affected(spec, "insert", key, query.execute(&mut *conn).await?)?;
    }

    for key in &plan.to_update {
        let Some(row) = snapshot.get(key) else { continue };
        let mut query = sqlx::query(&update_sql);
        for value in &row.values {
            query = bind_value(query, value);
        }
        query = bind_key_filter(query, spec, key);
        counts.updated += affected(spec, "update", key, query.execute(&mut *conn).await?)?;
    }

    for key in &plan.to_delete {
        let query = bind_key_filter(sqlx::query(&delete_sql), spec, key);
        counts.deleted += affected(spec, "delete", key, query.execute(&mut *conn).await?)?;
    }

    Ok(counts)
}

/// Rows touched by one planned statement. A planned key that matches
/// nothing means the local read and the statement filter disagree.
fn affected(
    spec: &TableSpec,
    operation: &str,
    key: &RecordKey,
    done: SqliteQueryResult,
) -> DbResult<u64> {
    match done.rows_affected() {
        0 => Err(DbError::transaction(
            &spec.table,
            format!("{} of key '{}' affected no rows", operation, key),
        )),
        n => Ok(n),
    }
}

async fn read_local_keys(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
) -> DbResult<HashSet<RecordKey>> {
    let columns = spec
        .key_columns()
        .iter()
        .map(|c| key_expr(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {} FROM {}", columns, quote(&spec.table));
    if let Some(partition) = &spec.partition {
        sql.push_str(&format!(" WHERE TRIM({}) = ?", quote(&partition.column)));
    }

    let mut query = sqlx::query(&sql);
    if let Some(partition) = &spec.partition {
        query = query.bind(partition.value.clone());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    let width = spec.key_columns().len();

    let mut keys = HashSet::with_capacity(rows.len());
    for row in rows {
        let mut parts = Vec::with_capacity(width);
        for i in 0..width {
            let part: String = row.try_get(i)?;
            parts.push(part);
        }
        let key = RecordKey::from_parts(parts);
        if !key.is_empty() {
            keys.insert(key);
        }
    }
    Ok(keys)
}

// =============================================================================
// Statement Builders
// =============================================================================

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Key column as the differ sees it: text, trimmed, NULL read as `''`.
/// Shared by the key read and every statement filter.
fn key_expr(column: &str) -> String {
    format!("COALESCE(TRIM(CAST({} AS TEXT)), '')", quote(column))
}

/// `WHERE key_expr(k) = ? AND ... [AND TRIM(p) = ?]`
fn key_filter(spec: &TableSpec) -> String {
    let mut clauses: Vec<String> = spec
        .key_columns()
        .iter()
        .map(|c| format!("{} = ?", key_expr(c)))
        .collect();
    if let Some(partition) = &spec.partition {
        clauses.push(format!("TRIM({}) = ?", quote(&partition.column)));
    }
    clauses.join(" AND ")
}

fn insert_statement(spec: &TableSpec) -> String {
    let mut columns: Vec<String> = spec.key_columns().iter().map(|c| quote(c)).collect();
    columns.extend(spec.value_columns().iter().map(|c| quote(c)));
    if let Some(partition) = &spec.partition {
        columns.push(quote(&partition.column));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&spec.table),
        columns.join(", "),
        placeholders
    )
}

fn update_statement(spec: &TableSpec) -> String {
    let assignments = spec
        .value_columns()
        .iter()
        .map(|c| format!("{} = ?", quote(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} SET {} WHERE {}",
        quote(&spec.table),
        assignments,
        key_filter(spec)
    )
}

fn delete_statement(spec: &TableSpec) -> String {
    format!("DELETE FROM {} WHERE {}", quote(&spec.table), key_filter(spec))
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &ColumnValue) -> SqliteQuery<'q> {
    match value {
        ColumnValue::Integer(i) => query.bind(*i),
        ColumnValue::Real(f) => query.bind(*f),
        ColumnValue::Text(s) => query.bind(s.clone()),
    }
}

fn bind_key_filter<'q>(
    mut query: SqliteQuery<'q>,
    spec: &TableSpec,
    key: &RecordKey,
) -> SqliteQuery<'q> {
    for part in key.parts() {
        query = query.bind(part.clone());
    }
    if let Some(partition) = &spec.partition {
        query = query.bind(partition.value.clone());
    }
    query
}
