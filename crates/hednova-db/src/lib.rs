//! # hednova-db: Database Layer for the Hednova Integrator
//!
//! SQLite access with sqlx: the pool, embedded migrations, the session
//! store, per-feed state and the transactional table synchronizer.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Integrator Data Flow                                │
//! │                                                                         │
//! │  CycleOrchestrator (hednova-sync)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    hednova-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ SessionStore  │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ FeedState     │    │ 0001, 0002   │  │   │
//! │  │   │               │    │ Mirror        │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (integration_* and KR_* tables)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hednova_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("hednova.db")).await?;
//! let result = db.mirror().synchronize(&spec, &rows).await;
//! db.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DEFAULT_CONNECT_TIMEOUT};

pub use repository::feed::{FeedState, FeedStateRepository};
pub use repository::mirror::MirrorRepository;
pub use repository::session::{SessionStore, SESSION_CODE};
