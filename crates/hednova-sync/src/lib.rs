//! # hednova-sync: Remote Fetcher and Cycle Orchestrator
//!
//! This crate talks to the DIA web service and runs the integration cycles
//! that mirror its reports into the local database.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CycleOrchestrator                                  │
//! │                                                                         │
//! │  Spawned as a Tokio task by the integrator binary                      │
//! │  One cycle at a time, fixed interval, stop at cycle boundaries         │
//! └──────────────┬──────────────────────────────┬───────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────────────────┐
//! │  ReportSource (trait)    │   │  hednova-db                              │
//! │                          │   │                                          │
//! │  DiaClient: login,       │   │  SessionStore       single token row     │
//! │  report fetch, base64    │   │  FeedStateRepository last success        │
//! │  payload decoding        │   │  MirrorRepository   table synchronizer   │
//! └──────────────────────────┘   └──────────────────────────────────────────┘
//!
//!   IntegratorConfig (TOML + env) ──► FeedRegistry (code → TableSpec)
//! ```
//!
//! ## Module Organization
//! - [`client`] - `ReportSource` trait and the DIA HTTP client
//! - [`config`] - Integrator configuration
//! - [`error`] - Integration error types
//! - [`orchestrator`] - `CycleOrchestrator`, cycle reports and status
//! - [`payload`] - Base64/JSON report payload decoding
//! - [`registry`] - Feed registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hednova_sync::{CycleOrchestrator, DiaClient, IntegratorConfig};
//!
//! let config = IntegratorConfig::load(None)?;
//! let client = Arc::new(DiaClient::new(&config)?);
//!
//! let mut orchestrator = CycleOrchestrator::new(config, client)?;
//! orchestrator.start();
//!
//! let status = orchestrator.status().await;
//! println!("Last run: {:?}", status.last_run);
//!
//! orchestrator.stop().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod registry;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{DiaClient, FetchOutcome, FetchRequest, FetchStatus, ReportSource};
pub use config::{
    DatabaseSettings, FeedConfig, IntegratorConfig, IntegratorSettings, RemoteSettings,
    ScheduleSettings,
};
pub use error::{IntegrationError, IntegrationResult};
pub use orchestrator::{
    CycleObserver, CycleOrchestrator, CycleReport, IntegratorStatus, NoOpObserver,
};
pub use payload::{decode_payload, extract_rows};
pub use registry::{Feed, FeedRegistry};
