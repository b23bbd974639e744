//! # Repository Module
//!
//! Database repository implementations for the integrator.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cycle Orchestrator                                                     │
//! │       │                                                                 │
//! │       ├── db.session_store()  → SessionStore        (integration_session)│
//! │       ├── db.feeds()          → FeedStateRepository (integration_feed)  │
//! │       └── db.mirror()         → MirrorRepository    (KR_* tables)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`SessionStore`](session::SessionStore) - Active session token
//! - [`FeedStateRepository`](feed::FeedStateRepository) - Per-feed last success
//! - [`MirrorRepository`](mirror::MirrorRepository) - Table synchronizer

pub mod feed;
pub mod mirror;
pub mod session;
