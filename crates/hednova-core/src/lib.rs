//! # hednova-core: Reconciliation Logic
//!
//! Pure types and algorithms of the Hednova integrator. This crate has ZERO
//! I/O dependencies: it knows nothing about HTTP or SQL.
//!
//! ## Module Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           hednova-core                                  │
//! │                                                                         │
//! │  ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌─────────────┐        │
//! │  │  types   │──►│   spec   │──►│ normalize  │──►│    diff     │        │
//! │  │ RemoteRow│   │ TableSpec│   │ Normalized │   │ KeySetDiff  │        │
//! │  │SyncResult│   │ RecordKey│   │ Snapshot   │   │             │        │
//! │  └──────────┘   └────┬─────┘   └────────────┘   └─────────────┘        │
//! │                      │                                                  │
//! │                 ┌────┴─────┐   ┌──────────┐                            │
//! │                 │ catalog  │   │  error   │                            │
//! │                 │ ENT-02.. │   │CoreError │                            │
//! │                 └──────────┘   └──────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod spec;
pub mod types;

pub use catalog::{builtin_spec, builtin_title, BUILTIN_CODES, JOIN_COLUMN};
pub use diff::{diff, KeySetDiff, SyncKey};
pub use error::{CoreError, CoreResult};
pub use normalize::{NormalizedRow, NormalizedSnapshot};
pub use spec::{
    is_identifier, ColumnMapping, ColumnSource, KeyPart, KeySpec, Partition, RecordKey, TableSpec,
    DEFAULT_KEY_SEPARATOR,
};
pub use types::{
    token_preview, ColumnValue, OperationMarker, RemoteRow, Session, SyncCounts, SyncResult,
    OPERATION_MARKER_FIELD,
};
