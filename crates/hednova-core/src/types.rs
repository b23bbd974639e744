//! # Domain Types
//!
//! Core types shared by the fetcher, the synchronizer and the orchestrator.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   RemoteRow     │   │   ColumnValue   │   │    Session      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  field → JSON   │   │  Text / Real /  │   │  token          │       │
//! │  │  scalar         │   │  Integer        │   │  issued_at      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ OperationMarker │   │   SyncResult    │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  Insert (2)     │   │  inserted       │                             │
//! │  │  Update (3)     │   │  updated        │                             │
//! │  │  Delete (4)     │   │  deleted, error │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the source's per-row operation hint in marker-bearing feeds.
pub const OPERATION_MARKER_FIELD: &str = "islemturu";

// =============================================================================
// Remote Row
// =============================================================================

/// One decoded record of a remote report snapshot.
///
/// Values are kept as raw JSON scalars; the table spec decides whether a
/// field is read as text or as a number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRow(Map<String, Value>);

impl RemoteRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        RemoteRow(Map::new())
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Returns the raw JSON value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Reads a field as trimmed text.
    ///
    /// Missing fields and `null` read as `""`; numbers and booleans use their
    /// JSON rendering (`13482`, `1.5`, `true`).
    pub fn text(&self, field: &str) -> String {
        match self.0.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Reads a field as a number.
    ///
    /// Accepts JSON numbers and numeric strings (a decimal comma is accepted
    /// when the string has no dot). Anything else coerces to `0.0`.
    pub fn number(&self, field: &str) -> f64 {
        match self.0.get(field) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => parse_number(s).unwrap_or(0.0),
            Some(Value::Bool(true)) => 1.0,
            _ => 0.0,
        }
    }

    /// Returns the advisory operation marker, if the feed supplies one.
    pub fn operation_marker(&self) -> Option<OperationMarker> {
        self.0.get(OPERATION_MARKER_FIELD).and_then(OperationMarker::from_value)
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the row carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RemoteRow {
    fn from(map: Map<String, Value>) -> Self {
        RemoteRow(map)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().or_else(|| {
        if trimmed.contains('.') {
            None
        } else {
            trimmed.replace(',', ".").parse::<f64>().ok()
        }
    })
}

// =============================================================================
// Operation Marker
// =============================================================================

/// Per-row operation hint supplied by some feeds (`islemturu`).
///
/// Advisory only: the key-set differ decides what is inserted, updated or
/// deleted. The marker is kept so disagreements can be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMarker {
    Insert,
    Update,
    Delete,
}

impl OperationMarker {
    /// Maps the source's numeric codes: 2 insert, 3 update, 4 delete.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(OperationMarker::Insert),
            3 => Some(OperationMarker::Update),
            4 => Some(OperationMarker::Delete),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().and_then(Self::from_code),
            Value::String(s) => s.trim().parse::<i64>().ok().and_then(Self::from_code),
            _ => None,
        }
    }
}

// =============================================================================
// Column Value
// =============================================================================

/// A normalized value ready to be bound to a statement parameter.
///
/// Deserializes untagged so constants in config read naturally
/// (`value = 1`, `value = "STUNIT"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Integer(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Real(value)
    }
}

// =============================================================================
// Session
// =============================================================================

/// The authorization token issued by the remote service.
///
/// Exactly one active session exists per deployment; every refresh
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session token.
    pub token: String,

    /// When the token was obtained.
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session issued now.
    pub fn issued_now(token: impl Into<String>) -> Self {
        Session {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }

    /// Short prefix of the token for log lines.
    pub fn token_preview(&self) -> String {
        token_preview(&self.token)
    }
}

/// Returns at most the first 6 characters of a token followed by `…`.
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}…", prefix)
}

// =============================================================================
// Sync Result
// =============================================================================

/// Mutation counts of one committed table synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl SyncCounts {
    /// Total number of mutated rows.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

/// Outcome of one `synchronize` call, reported per target table.
///
/// A failed synchronization always reports zero counts: the transaction was
/// rolled back, so nothing it did is observable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Target table name.
    pub table: String,

    /// Rows inserted.
    pub inserted: u64,

    /// Rows overwritten.
    pub updated: u64,

    /// Rows removed.
    pub deleted: u64,

    /// Remote rows dropped for having an empty key.
    pub skipped: u64,

    /// Failure message, `None` on success.
    pub error: Option<String>,
}

impl SyncResult {
    /// Builds a successful result.
    pub fn success(table: impl Into<String>, counts: SyncCounts, skipped: u64) -> Self {
        SyncResult {
            table: table.into(),
            inserted: counts.inserted,
            updated: counts.updated,
            deleted: counts.deleted,
            skipped,
            error: None,
        }
    }

    /// Builds a failed result with zero counts.
    pub fn failure(table: impl Into<String>, error: impl Into<String>) -> Self {
        SyncResult {
            table: table.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// True when the synchronization committed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The committed counts.
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            inserted: self.inserted,
            updated: self.updated,
            deleted: self.deleted,
        }
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(
                f,
                "{}: inserted {}, updated {}, deleted {}",
                self.table, self.inserted, self.updated, self.deleted
            ),
            Some(err) => write!(f, "{}: failed ({})", self.table, err),
        }
    }
}
