//! # Key-Set Differ
//!
//! Pure set arithmetic between the keys of a remote snapshot and the keys
//! currently stored locally.
//!
//! ```text
//!        remote keys              local keys
//!     ┌───────────────┐      ┌───────────────┐
//!     │  to_insert    │ ┌────┼──┐            │
//!     │  (R - L)      │ │ to_update (R ∩ L)  │
//!     │               │ └────┼──┘ to_delete  │
//!     └───────────────┘      │    (L - R)    │
//!                            └───────────────┘
//! ```
//!
//! Blank keys are never classified. Output sets are ordered so the
//! synchronizer issues statements in a deterministic order.

use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

use crate::spec::RecordKey;

/// Anything that can serve as a reconciliation key.
pub trait SyncKey: Clone + Eq + Hash + Ord {
    /// Blank keys are skipped on both sides.
    fn is_blank(&self) -> bool;
}

impl SyncKey for RecordKey {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl SyncKey for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl SyncKey for &str {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

/// The three disjoint classifications produced by [`diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySetDiff<K: Ord> {
    pub to_insert: BTreeSet<K>,
    pub to_update: BTreeSet<K>,
    pub to_delete: BTreeSet<K>,
}

impl<K: Ord> Default for KeySetDiff<K> {
    fn default() -> Self {
        KeySetDiff {
            to_insert: BTreeSet::new(),
            to_update: BTreeSet::new(),
            to_delete: BTreeSet::new(),
        }
    }
}

impl<K: Ord> KeySetDiff<K> {
    /// True when nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Classifies remote keys against the local key set.
///
/// `to_insert = R - L`, `to_update = R ∩ L`, `to_delete = L - R`, where `R`
/// and `L` exclude blank keys.
pub fn diff<K, I>(remote_keys: I, local_keys: &HashSet<K>) -> KeySetDiff<K>
where
    K: SyncKey,
    I: IntoIterator<Item = K>,
{
    let remote: HashSet<K> = remote_keys.into_iter().filter(|k| !k.is_blank()).collect();

    let mut result = KeySetDiff::default();
    for key in &remote {
        if local_keys.contains(key) {
            result.to_update.insert(key.clone());
        } else {
            result.to_insert.insert(key.clone());
        }
    }
    result.to_delete = local_keys
        .iter()
        .filter(|k| !k.is_blank() && !remote.contains(*k))
        .cloned()
        .collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(keys: &[&'static str]) -> HashSet<&'static str> {
        keys.iter().copied().collect()
    }

    fn sorted(keys: &[&'static str]) -> BTreeSet<&'static str> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_empty_key_rows_are_skipped() {
        let result = diff(vec!["", "A"], &set(&[]));

        assert_eq!(result.to_insert, sorted(&["A"]));
        assert!(result.to_update.is_empty());
        assert!(result.to_delete.is_empty());
    }

    #[test]
    fn test_full_replacement() {
        let result = diff(vec!["B"], &set(&["A", "B"]));

        assert!(result.to_insert.is_empty());
        assert_eq!(result.to_update, sorted(&["B"]));
        assert_eq!(result.to_delete, sorted(&["A"]));
    }

    #[test]
    fn test_empty_snapshot_deletes_everything() {
        let result = diff(Vec::<&str>::new(), &set(&["A", "B"]));
        assert_eq!(result.to_delete, sorted(&["A", "B"]));
    }

    #[test]
    fn test_blank_local_keys_are_left_alone() {
        let result = diff(vec!["A"], &set(&["A", " "]));
        assert!(result.to_delete.is_empty());
    }

    #[test]
    fn test_record_keys() {
        let local: HashSet<RecordKey> = [RecordKey::from_parts(["1", "2"])].into_iter().collect();
        let remote = vec![
            RecordKey::from_parts(["1", "2"]),
            RecordKey::from_parts(["", ""]),
            RecordKey::from_parts(["1", "3"]),
        ];

        let result = diff(remote, &local);
        assert_eq!(result.to_update.len(), 1);
        assert_eq!(result.to_insert.len(), 1);
        assert!(result.to_delete.is_empty());
    }

    proptest! {
        #[test]
        fn prop_partitions_union(
            remote in proptest::collection::vec("[a-e]{0,2}", 0..20),
            local in proptest::collection::hash_set("[a-e]{1,2}", 0..20),
        ) {
            let result = diff(remote.clone(), &local);
            let remote_keys: BTreeSet<String> =
                remote.into_iter().filter(|k| !k.is_empty()).collect();
            let local_keys: BTreeSet<String> = local.into_iter().collect();

            prop_assert!(result.to_insert.is_disjoint(&result.to_update));
            prop_assert!(result.to_update.is_disjoint(&result.to_delete));
            prop_assert!(result.to_insert.is_disjoint(&result.to_delete));

            let inserted_or_updated: BTreeSet<String> =
                result.to_insert.union(&result.to_update).cloned().collect();
            prop_assert_eq!(inserted_or_updated, remote_keys);

            let updated_or_deleted: BTreeSet<String> =
                result.to_update.union(&result.to_delete).cloned().collect();
            prop_assert_eq!(updated_or_deleted, local_keys);
        }

        #[test]
        fn prop_reapplying_converges(
            remote in proptest::collection::hash_set("[a-z]{1,3}", 0..30),
            local in proptest::collection::hash_set("[a-z]{1,3}", 0..30),
        ) {
            let first = diff(remote.iter().cloned(), &local);
            let after: HashSet<String> = local
                .iter()
                .filter(|k| !first.to_delete.contains(*k))
                .cloned()
                .chain(first.to_insert.iter().cloned())
                .collect();

            let second = diff(remote.iter().cloned(), &after);
            prop_assert!(second.to_insert.is_empty());
            prop_assert!(second.to_delete.is_empty());
            prop_assert_eq!(second.to_update.len(), remote.len());
        }
    }
}
