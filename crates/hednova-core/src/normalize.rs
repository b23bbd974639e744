//! Snapshot normalization: remote rows → keyed, column-ordered values.

use std::collections::{BTreeMap, HashSet};

use crate::diff::{diff, KeySetDiff};
use crate::spec::{RecordKey, TableSpec};
use crate::types::{ColumnValue, OperationMarker, RemoteRow};

/// A remote row after key extraction and column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub key: RecordKey,
    /// One value per `TableSpec::columns` entry.
    pub values: Vec<ColumnValue>,
    pub marker: Option<OperationMarker>,
}

/// A whole snapshot normalized against one [`TableSpec`].
///
/// Rows with an empty key are dropped and counted. When a key occurs more
/// than once the last occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    rows: BTreeMap<RecordKey, NormalizedRow>,
    skipped: u64,
    duplicates: u64,
}

impl NormalizedSnapshot {
    pub fn build(spec: &TableSpec, rows: &[RemoteRow]) -> Self {
        let mut snapshot = NormalizedSnapshot::default();

        for row in rows {
            let key = spec.key_of(row);
            if key.is_empty() {
                snapshot.skipped += 1;
                continue;
            }
            let normalized = NormalizedRow {
                key: key.clone(),
                values: spec.values_of(row),
                marker: row.operation_marker(),
            };
            if snapshot.rows.insert(key, normalized).is_some() {
                snapshot.duplicates += 1;
            }
        }

        snapshot
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped for an empty key.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Rows shadowed by a later row with the same key.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.rows.keys()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&NormalizedRow> {
        self.rows.get(key)
    }

    /// Runs the differ against the local key set.
    pub fn diff(&self, local_keys: &HashSet<RecordKey>) -> KeySetDiff<RecordKey> {
        diff(self.rows.keys().cloned(), local_keys)
    }

    /// Counts rows whose operation marker contradicts the computed
    /// classification. Markers never change what is applied.
    pub fn marker_disagreements(&self, plan: &KeySetDiff<RecordKey>) -> usize {
        self.rows
            .values()
            .filter(|row| match row.marker {
                Some(OperationMarker::Delete) => true,
                Some(OperationMarker::Insert) => plan.to_update.contains(&row.key),
                Some(OperationMarker::Update) => plan.to_insert.contains(&row.key),
                None => false,
            })
            .count()
    }
}
