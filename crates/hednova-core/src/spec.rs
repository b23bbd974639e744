//! # Table Specifications
//!
//! A [`TableSpec`] describes how one remote feed lands in one local table:
//! which remote field(s) form the key, which local column(s) hold it, how the
//! remaining fields map to columns, and an optional partition predicate.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TableSpec "KR_GECOUST"                                                 │
//! │                                                                         │
//! │   key:        Single { field: "key", column: "ENT01" }                  │
//! │   columns:    KOD  ← Text("kod")                                        │
//! │               AD   ← Text("aciklama")                                   │
//! │               AP10 ← Constant(1)                                        │
//! │   partition:  EVRAKNO = 'STUNIT'                                        │
//! │                                                                         │
//! │   RemoteRow ──key_of()──► RecordKey ["13482"]                           │
//! │   RemoteRow ──values_of()──► [Text("HZ"), Text("Hizmet"), Integer(1)]   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote keys and local keys are both expressed as [`RecordKey`]s built from
//! trimmed parts, so a composite key read back from the database compares
//! equal to the one computed from the snapshot.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{ColumnValue, RemoteRow};

/// Separator used when a composite key is rendered as a single string.
pub const DEFAULT_KEY_SEPARATOR: &str = "|";

fn default_separator() -> String {
    DEFAULT_KEY_SEPARATOR.to_string()
}

fn default_prune() -> bool {
    true
}

// =============================================================================
// Record Key
// =============================================================================

/// Identity of a record on both sides of the reconciliation.
///
/// Single keys have one part; composite keys have one part per key field, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(Vec<String>);

impl RecordKey {
    /// Builds a key from raw parts, trimming each one.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RecordKey(parts.into_iter().map(|p| p.as_ref().trim().to_string()).collect())
    }

    /// Single-part key.
    pub fn single(value: impl AsRef<str>) -> Self {
        Self::from_parts([value])
    }

    /// The key parts in declaration order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// A key is empty when it has no parts or every part is blank.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|p| p.is_empty())
    }

    /// Renders the key as a single string.
    pub fn joined(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined(DEFAULT_KEY_SEPARATOR))
    }
}

// =============================================================================
// Key / Column Definitions
// =============================================================================

/// One (remote field, local column) pair of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPart {
    pub field: String,
    pub column: String,
}

impl KeyPart {
    pub fn new(field: impl Into<String>, column: impl Into<String>) -> Self {
        KeyPart {
            field: field.into(),
            column: column.into(),
        }
    }
}

/// How a record's identity is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySpec {
    /// One remote field stored in one join column.
    Single { field: String, column: String },

    /// Several remote fields, each stored in its own join column.
    Composite {
        parts: Vec<KeyPart>,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

impl KeySpec {
    /// The key parts, single keys yielding one.
    pub fn parts(&self) -> Vec<KeyPart> {
        match self {
            KeySpec::Single { field, column } => vec![KeyPart::new(field, column)],
            KeySpec::Composite { parts, .. } => parts.clone(),
        }
    }

    /// Separator used when rendering keys of this spec.
    pub fn separator(&self) -> &str {
        match self {
            KeySpec::Single { .. } => DEFAULT_KEY_SEPARATOR,
            KeySpec::Composite { separator, .. } => separator,
        }
    }
}

/// Where a column's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    /// Remote field read as trimmed text.
    Text(String),
    /// Remote field coerced to a number.
    Number(String),
    /// Fixed value written on insert and update.
    Constant(ColumnValue),
}

/// One local column and its value source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column: String,
    pub source: ColumnSource,
}

impl ColumnMapping {
    /// Evaluates the mapping against a remote row.
    pub fn value_of(&self, row: &RemoteRow) -> ColumnValue {
        match &self.source {
            ColumnSource::Text(field) => ColumnValue::Text(row.text(field)),
            ColumnSource::Number(field) => ColumnValue::Real(row.number(field)),
            ColumnSource::Constant(value) => value.clone(),
        }
    }
}

/// Fixed discriminator scoping a table to a subset of its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub column: String,
    pub value: String,
}

// =============================================================================
// Table Spec
// =============================================================================

/// Mapping of one remote feed onto one local table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Local table name.
    pub table: String,

    /// Key definition.
    pub key: KeySpec,

    /// Non-key columns, in statement order.
    pub columns: Vec<ColumnMapping>,

    /// Optional partition predicate.
    #[serde(default)]
    pub partition: Option<Partition>,

    /// Delete local rows missing from the snapshot. Incremental feeds turn
    /// this off.
    #[serde(default = "default_prune")]
    pub prune_missing: bool,
}

impl TableSpec {
    /// Starts a spec keyed by a single field.
    pub fn single(
        table: impl Into<String>,
        field: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        TableSpec {
            table: table.into(),
            key: KeySpec::Single {
                field: field.into(),
                column: column.into(),
            },
            columns: Vec::new(),
            partition: None,
            prune_missing: true,
        }
    }

    /// Starts a spec keyed by several fields, given as `(field, column)`.
    pub fn composite(table: impl Into<String>, parts: &[(&str, &str)]) -> Self {
        TableSpec {
            table: table.into(),
            key: KeySpec::Composite {
                parts: parts.iter().map(|(f, c)| KeyPart::new(*f, *c)).collect(),
                separator: default_separator(),
            },
            columns: Vec::new(),
            partition: None,
            prune_missing: true,
        }
    }

    /// Adds a text column.
    pub fn text(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.columns.push(ColumnMapping {
            column: column.into(),
            source: ColumnSource::Text(field.into()),
        });
        self
    }

    /// Adds a numeric column.
    pub fn number(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.columns.push(ColumnMapping {
            column: column.into(),
            source: ColumnSource::Number(field.into()),
        });
        self
    }

    /// Adds a constant column.
    pub fn constant(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.columns.push(ColumnMapping {
            column: column.into(),
            source: ColumnSource::Constant(value.into()),
        });
        self
    }

    /// Scopes the table by `column = value`.
    pub fn partitioned(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.partition = Some(Partition {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Disables the delete step.
    pub fn keep_missing(mut self) -> Self {
        self.prune_missing = false;
        self
    }

    /// Builds the record key of a remote row.
    pub fn key_of(&self, row: &RemoteRow) -> RecordKey {
        match &self.key {
            KeySpec::Single { field, .. } => RecordKey::single(row.text(field)),
            KeySpec::Composite { parts, .. } => {
                RecordKey::from_parts(parts.iter().map(|p| row.text(&p.field)))
            }
        }
    }

    /// Evaluates every column mapping, in `columns` order.
    pub fn values_of(&self, row: &RemoteRow) -> Vec<ColumnValue> {
        self.columns.iter().map(|m| m.value_of(row)).collect()
    }

    /// Join columns, in key-part order.
    pub fn key_columns(&self) -> Vec<&str> {
        match &self.key {
            KeySpec::Single { column, .. } => vec![column.as_str()],
            KeySpec::Composite { parts, .. } => parts.iter().map(|p| p.column.as_str()).collect(),
        }
    }

    /// Mapped (non-key) column names, in `columns` order.
    pub fn value_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|m| m.column.as_str()).collect()
    }

    /// Checks that the table spec is safe to turn into SQL.
    pub fn validate(&self) -> CoreResult<()> {
        ensure_identifier("table", &self.table)?;

        let parts = self.key.parts();
        if parts.is_empty() {
            return Err(CoreError::EmptyKey {
                table: self.table.clone(),
            });
        }
        if let KeySpec::Composite { separator, .. } = &self.key {
            if separator.is_empty() {
                return Err(CoreError::EmptySeparator {
                    table: self.table.clone(),
                });
            }
        }

        let mut key_columns = HashSet::new();
        for part in &parts {
            ensure_identifier("key column", &part.column)?;
            if part.field.trim().is_empty() {
                return Err(CoreError::EmptyField {
                    table: self.table.clone(),
                    column: part.column.clone(),
                });
            }
            if !key_columns.insert(part.column.to_ascii_uppercase()) {
                return Err(CoreError::DuplicateColumn {
                    table: self.table.clone(),
                    column: part.column.clone(),
                });
            }
        }

        if self.columns.is_empty() {
            return Err(CoreError::EmptyMapping {
                table: self.table.clone(),
            });
        }

        let mut seen = HashSet::new();
        for mapping in &self.columns {
            ensure_identifier("column", &mapping.column)?;
            let upper = mapping.column.to_ascii_uppercase();
            if key_columns.contains(&upper) {
                return Err(CoreError::KeyColumnMapped {
                    table: self.table.clone(),
                    column: mapping.column.clone(),
                });
            }
            if !seen.insert(upper) {
                return Err(CoreError::DuplicateColumn {
                    table: self.table.clone(),
                    column: mapping.column.clone(),
                });
            }
            match &mapping.source {
                ColumnSource::Text(field) | ColumnSource::Number(field) if field.trim().is_empty() => {
                    return Err(CoreError::EmptyField {
                        table: self.table.clone(),
                        column: mapping.column.clone(),
                    });
                }
                _ => {}
            }
        }

        if let Some(partition) = &self.partition {
            ensure_identifier("partition column", &partition.column)?;
            let upper = partition.column.to_ascii_uppercase();
            if key_columns.contains(&upper) || seen.contains(&upper) {
                return Err(CoreError::DuplicateColumn {
                    table: self.table.clone(),
                    column: partition.column.clone(),
                });
            }
        }

        Ok(())
    }
}

/// True for non-empty names made of ASCII letters, digits and `_`, not
/// starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn ensure_identifier(what: &'static str, value: &str) -> CoreResult<()> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier {
            what,
            value: value.to_string(),
        })
    }
}
