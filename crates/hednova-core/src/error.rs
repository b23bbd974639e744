//! # Error Types
//!
//! Domain error types for hednova-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hednova-core errors (this file)                                       │
//! │  └── CoreError        - Invalid table specifications                   │
//! │                                                                         │
//! │  hednova-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  hednova-sync errors (separate crate)                                  │
//! │  └── IntegrationError - Transport/auth/decode/transaction taxonomy     │
//! │                                                                         │
//! │  Flow: CoreError → DbError → IntegrationError → CycleReport            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Errors raised while validating a [`TableSpec`](crate::TableSpec).
///
/// Table and column names are interpolated into SQL (values never are), so
/// every spec is validated once when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A table or column name contains characters outside `[A-Za-z0-9_]`.
    #[error("Invalid {what} identifier: '{value}'")]
    InvalidIdentifier { what: &'static str, value: String },

    /// The table maps no columns besides the key.
    #[error("Table {table} maps no columns")]
    EmptyMapping { table: String },

    /// The same column appears twice in the mapping.
    #[error("Table {table} maps column {column} more than once")]
    DuplicateColumn { table: String, column: String },

    /// A key column is also listed in the column mapping.
    #[error("Table {table} maps key column {column} as a regular column")]
    KeyColumnMapped { table: String, column: String },

    /// A key has no parts.
    #[error("Table {table} has an empty key definition")]
    EmptyKey { table: String },

    /// Composite key declared with an empty separator.
    #[error("Table {table} uses an empty composite-key separator")]
    EmptySeparator { table: String },

    /// A mapped field name is empty.
    #[error("Table {table} maps column {column} from an empty field name")]
    EmptyField { table: String, column: String },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DuplicateColumn {
            table: "KR_IMLT00".into(),
            column: "KOD".into(),
        };
        assert!(err.to_string().contains("KR_IMLT00"));
        assert!(err.to_string().contains("KOD"));
    }
}
