//! # Cycle Orchestrator
//!
//! Runs integration cycles, once on demand or on a fixed interval.
//!
//! ## Cycle Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           One Integration Cycle                         │
//! │                                                                         │
//! │  running flag set? ── yes ──► skip, report `skipped = true`            │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  open Database (scoped to this cycle)                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  authenticate ──► store token        (failure: reuse stored token)     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  for each feed, in order:                                              │
//! │     fetch ──► 401/403? re-authenticate once, fetch again               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │     MirrorRepository::synchronize (one transaction per table)          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │     success? record last_success_at for the feed                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  close Database, publish CycleReport to status and observer            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Schedule
//! `start()` spawns a task driven by `tokio::time::interval`: the first tick
//! fires immediately, missed ticks are skipped. `stop()` ends the schedule
//! at the next cycle boundary; a cycle in flight always runs to completion.
//!
//! `run_feed()` syncs one feed on demand through the same steps, under the
//! same running flag.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use hednova_core::{token_preview, SyncCounts, SyncResult};
use hednova_db::{Database, SessionStore};

use crate::client::{FetchRequest, ReportSource};
use crate::config::IntegratorConfig;
use crate::error::{IntegrationError, IntegrationResult};
use crate::registry::{Feed, FeedRegistry};

/// Parameter carrying the last successful fetch time of incremental feeds.
pub const SINCE_PARAM: &str = "tarihsaat";

/// Format of [`SINCE_PARAM`], in local time.
pub const SINCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Cycle Report
// =============================================================================

/// Summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// The cycle did not run because another one was in flight.
    pub skipped: bool,

    /// A session token was available for fetching.
    pub session_present: bool,

    /// One result per feed, in feed order.
    pub tables: Vec<SyncResult>,

    /// Every error met during the cycle, feed failures included.
    pub errors: Vec<String>,
}

impl CycleReport {
    fn begin(cycle_id: Uuid) -> Self {
        let now = Utc::now();
        CycleReport {
            cycle_id,
            started_at: now,
            finished_at: now,
            skipped: false,
            session_present: false,
            tables: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn skipped(cycle_id: Uuid) -> Self {
        CycleReport {
            skipped: true,
            ..Self::begin(cycle_id)
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// True when the cycle ran and nothing failed.
    pub fn is_success(&self) -> bool {
        !self.skipped && self.errors.is_empty()
    }

    /// Counts summed over every committed table.
    pub fn totals(&self) -> SyncCounts {
        self.tables
            .iter()
            .filter(|t| t.is_success())
            .fold(SyncCounts::default(), |acc, t| SyncCounts {
                inserted: acc.inserted + t.inserted,
                updated: acc.updated + t.updated,
                deleted: acc.deleted + t.deleted,
            })
    }

    /// Number of tables whose synchronization failed.
    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|t| !t.is_success()).count()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "cycle {} skipped", self.cycle_id);
        }
        let totals = self.totals();
        write!(
            f,
            "cycle {}: {} tables ({} failed), inserted {}, updated {}, deleted {}, {} errors",
            self.cycle_id,
            self.tables.len(),
            self.failed_tables(),
            totals.inserted,
            totals.updated,
            totals.deleted,
            self.errors.len()
        )
    }
}

// =============================================================================
// Integrator Status
// =============================================================================

/// State exposed to whatever drives the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegratorStatus {
    /// When the last cycle finished.
    pub last_run: Option<DateTime<Utc>>,

    /// Report of the last cycle that ran.
    pub last_report: Option<CycleReport>,

    /// Latest result per target table.
    pub tables: BTreeMap<String, SyncResult>,

    /// Whether the last cycle had a session token.
    pub session_present: bool,
}

// =============================================================================
// Observer Trait
// =============================================================================

/// Receives cycle progress (implemented by a UI or a service wrapper).
pub trait CycleObserver: Send + Sync {
    /// A cycle began.
    fn cycle_started(&self, cycle_id: Uuid);

    /// One feed finished synchronizing, successfully or not.
    fn table_synced(&self, feed_code: &str, result: &SyncResult);

    /// A cycle ended.
    fn cycle_finished(&self, report: &CycleReport);
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl CycleObserver for NoOpObserver {
    fn cycle_started(&self, _cycle_id: Uuid) {}
    fn table_synced(&self, _feed_code: &str, _result: &SyncResult) {}
    fn cycle_finished(&self, _report: &CycleReport) {}
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives integration cycles.
pub struct CycleOrchestrator {
    inner: Arc<CycleRunner>,

    /// Shutdown sender of the scheduled task.
    shutdown_tx: Option<mpsc::Sender<()>>,

    /// Scheduled task (set after start).
    task: Option<JoinHandle<()>>,
}

impl CycleOrchestrator {
    /// Creates an orchestrator; resolves and validates the feed list.
    pub fn new(config: IntegratorConfig, source: Arc<dyn ReportSource>) -> IntegrationResult<Self> {
        Self::with_observer(config, source, Arc::new(NoOpObserver))
    }

    /// Creates an orchestrator with a custom observer.
    pub fn with_observer(
        config: IntegratorConfig,
        source: Arc<dyn ReportSource>,
        observer: Arc<dyn CycleObserver>,
    ) -> IntegrationResult<Self> {
        let registry = FeedRegistry::from_config(&config.feeds)?;
        if registry.is_empty() {
            return Err(IntegrationError::InvalidConfig("no feeds configured".into()));
        }

        Ok(CycleOrchestrator {
            inner: Arc::new(CycleRunner {
                config: Arc::new(config),
                source,
                registry,
                observer,
                status: RwLock::new(IntegratorStatus::default()),
                running: AtomicBool::new(false),
            }),
            shutdown_tx: None,
            task: None,
        })
    }

    /// The resolved feeds.
    pub fn registry(&self) -> &FeedRegistry {
        &self.inner.registry
    }

    /// Runs one cycle now. Skipped if a cycle is already in flight.
    pub async fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle().await
    }

    /// Synchronizes a single feed now, outside the schedule.
    ///
    /// Shares the running flag with cycles: fails with
    /// [`IntegrationError::Busy`] while a cycle is in flight.
    pub async fn run_feed(&self, code: &str) -> IntegrationResult<SyncResult> {
        let span = info_span!("feed_run", code = %code);
        self.inner.run_feed(code).instrument(span).await
    }

    /// Schedules cycles at the configured interval.
    pub fn start(&mut self) {
        let interval = self.inner.config.interval();
        self.start_with_interval(interval);
    }

    /// Runs one cycle immediately, then one every `interval`.
    ///
    /// Calling this while already scheduled does nothing.
    pub fn start_with_interval(&mut self, interval: Duration) {
        if self.is_scheduled() {
            debug!("Orchestrator already scheduled");
            return;
        }

        info!(interval_secs = interval.as_secs(), "Starting cycle schedule");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let runner = Arc::clone(&self.inner);
        self.task = Some(tokio::spawn(Self::schedule_loop(runner, interval, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Cancels the schedule and waits for an in-flight cycle to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Schedule task ended abnormally");
            }
            info!("Cycle schedule stopped");
        }
    }

    /// True while the schedule task is alive.
    pub fn is_scheduled(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// True while a cycle is executing.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Snapshot of the current status.
    pub async fn status(&self) -> IntegratorStatus {
        self.inner.status.read().await.clone()
    }

    async fn schedule_loop(
        runner: Arc<CycleRunner>,
        interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    debug!("Schedule received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    let report = runner.run_cycle().await;
                    if !report.skipped {
                        info!(summary = %report, "Scheduled cycle finished");
                    }
                }
            }
        }
    }
}

impl Drop for CycleOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// Cycle Runner
// =============================================================================

/// Everything one cycle needs, shared with the schedule task.
struct CycleRunner {
    config: Arc<IntegratorConfig>,
    source: Arc<dyn ReportSource>,
    registry: FeedRegistry,
    observer: Arc<dyn CycleObserver>,
    status: RwLock<IntegratorStatus>,
    running: AtomicBool,
}

/// Clears the running flag however the cycle ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CycleRunner {
    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();

        let Some(_guard) = self.try_begin() else {
            warn!(cycle_id = %cycle_id, "Previous cycle still running, skipping");
            return CycleReport::skipped(cycle_id);
        };

        let span = info_span!("cycle", cycle_id = %cycle_id);
        let report = self.execute(cycle_id).instrument(span).await;

        {
            let mut status = self.status.write().await;
            status.last_run = Some(report.finished_at);
            status.session_present = report.session_present;
            for result in &report.tables {
                status.tables.insert(result.table.clone(), result.clone());
            }
            status.last_report = Some(report.clone());
        }

        self.observer.cycle_finished(&report);
        report
    }

    async fn execute(&self, cycle_id: Uuid) -> CycleReport {
        self.observer.cycle_started(cycle_id);
        let mut report = CycleReport::begin(cycle_id);
        info!(feeds = self.registry.len(), "Cycle started");

        let db = match Database::new(self.config.db_config()).await {
            Ok(db) => db,
            Err(e) => {
                let e = IntegrationError::from(e);
                error!(error = %e, "Database unavailable, cycle aborted");
                report.errors.push(e.to_string());
                return report.finish();
            }
        };

        self.run_feeds(&db, &mut report).await;
        db.close().await;

        let report = report.finish();
        info!(
            tables = report.tables.len(),
            failed = report.failed_tables(),
            errors = report.errors.len(),
            "Cycle finished"
        );
        report
    }

    async fn run_feeds(&self, db: &Database, report: &mut CycleReport) {
        let feeds = db.feeds();
        for feed in self.registry.iter() {
            if let Err(e) = feeds.register(&feed.code, &feed.report_code, &feed.title).await {
                report
                    .errors
                    .push(format!("{}: {}", feed.code, IntegrationError::from(e)));
            }
        }

        let sessions = db.session_store();
        let Some(mut token) = self.acquire_session(&sessions, &mut report.errors).await else {
            error!("No session available, skipping all feeds");
            return;
        };
        report.session_present = true;

        for feed in self.registry.iter() {
            let synced = self
                .sync_feed(db, &sessions, feed, &mut token, &mut report.errors)
                .await;
            let result = match synced {
                Ok(result) => result,
                Err(e) => SyncResult::failure(&feed.spec.table, e.to_string()),
            };

            if let Some(err) = &result.error {
                warn!(code = %feed.code, table = %feed.spec.table, error = %err, "Feed failed");
                report.errors.push(format!("{}: {}", feed.code, err));
            } else {
                info!(
                    code = %feed.code,
                    table = %feed.spec.table,
                    inserted = result.inserted,
                    updated = result.updated,
                    deleted = result.deleted,
                    skipped = result.skipped,
                    "Feed synchronized"
                );
            }

            self.observer.table_synced(&feed.code, &result);
            report.tables.push(result);
        }
    }

    async fn run_feed(&self, code: &str) -> IntegrationResult<SyncResult> {
        let feed = self
            .registry
            .get(code)
            .ok_or_else(|| IntegrationError::UnknownFeed(code.to_string()))?;

        let Some(_guard) = self.try_begin() else {
            warn!("Cycle in flight, feed run refused");
            return Err(IntegrationError::Busy);
        };

        let db = Database::new(self.config.db_config()).await?;
        let synced = self.run_single(&db, feed).await;
        db.close().await;

        let result = match synced {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Feed run failed");
                self.publish(feed, &SyncResult::failure(&feed.spec.table, e.to_string()))
                    .await;
                return Err(e);
            }
        };

        info!(
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            success = result.is_success(),
            "Feed run finished"
        );
        self.publish(feed, &result).await;
        Ok(result)
    }

    async fn run_single(&self, db: &Database, feed: &Feed) -> IntegrationResult<SyncResult> {
        db.feeds()
            .register(&feed.code, &feed.report_code, &feed.title)
            .await?;

        let sessions = db.session_store();
        let mut errors = Vec::new();
        let Some(mut token) = self.acquire_session(&sessions, &mut errors).await else {
            return Err(IntegrationError::NoSession);
        };

        let result = self
            .sync_feed(db, &sessions, feed, &mut token, &mut errors)
            .await;
        for err in &errors {
            debug!(error = %err, "Feed run note");
        }
        result
    }

    async fn publish(&self, feed: &Feed, result: &SyncResult) {
        self.status
            .write()
            .await
            .tables
            .insert(result.table.clone(), result.clone());
        self.observer.table_synced(&feed.code, result);
    }

    /// Logs in, falling back to the stored token when login fails.
    async fn acquire_session(
        &self,
        sessions: &SessionStore,
        errors: &mut Vec<String>,
    ) -> Option<String> {
        match self.source.authenticate().await {
            Ok(token) => {
                if let Err(e) = sessions.set_token(&token, Utc::now()).await {
                    errors.push(format!("session store: {}", IntegrationError::from(e)));
                }
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed, trying stored session");
                errors.push(format!("authentication: {}", e));

                match sessions.get_active_token().await {
                    Ok(Some(token)) => {
                        info!(token = %token_preview(&token), "Continuing with stored session");
                        Some(token)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        errors.push(format!("session store: {}", IntegrationError::from(e)));
                        None
                    }
                }
            }
        }
    }

    async fn sync_feed(
        &self,
        db: &Database,
        sessions: &SessionStore,
        feed: &Feed,
        token: &mut String,
        errors: &mut Vec<String>,
    ) -> IntegrationResult<SyncResult> {
        let request = self.fetch_request(db, feed, token).await?;
        let fetched_at = Utc::now();

        let mut outcome = self.source.fetch(&request).await;
        if outcome.is_session_rejected() {
            info!(code = %feed.code, "Session rejected, re-authenticating");
            *token = self.source.authenticate().await?;
            if let Err(e) = sessions.set_token(token.as_str(), Utc::now()).await {
                let e = IntegrationError::from(e);
                warn!(error = %e, "Refreshed session not stored");
                errors.push(format!("session store: {}", e));
            }
            outcome = self.source.fetch(&request.with_token(token.as_str())).await;
        }

        let rows = outcome.into_rows()?;
        debug!(code = %feed.code, rows = rows.len(), "Rows fetched");

        let result = db.mirror().synchronize(&feed.spec, &rows).await;
        if result.is_success() {
            db.feeds().record_success(&feed.code, fetched_at).await?;
        }
        Ok(result)
    }

    async fn fetch_request(
        &self,
        db: &Database,
        feed: &Feed,
        token: &str,
    ) -> IntegrationResult<FetchRequest> {
        let settings = &self.config.integrator;
        let mut request =
            FetchRequest::new(&feed.report_code, token, &settings.company, &settings.period);

        if let Some(detail) = &feed.detail {
            request = request.detail(detail);
        }

        if feed.incremental {
            let since = db.feeds().last_success(&feed.code).await?;
            let value = since
                .map(|at| Value::from(at.with_timezone(&Local).format(SINCE_FORMAT).to_string()))
                .unwrap_or(Value::Null);
            request = request.param(SINCE_PARAM, value);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(table: &str, inserted: u64, updated: u64, deleted: u64) -> SyncResult {
        SyncResult::success(
            table,
            SyncCounts {
                inserted,
                updated,
                deleted,
            },
            0,
        )
    }

    #[test]
    fn test_report_totals_ignore_failed_tables() {
        let mut report = CycleReport::begin(Uuid::new_v4());
        report.tables.push(result("KR_IMLT00", 2, 1, 0));
        report.tables.push(result("KR_CARI00", 0, 3, 1));
        report.tables.push(SyncResult::failure("KR_STOK00", "locked"));

        let totals = report.totals();
        assert_eq!(totals.inserted, 2);
        assert_eq!(totals.updated, 4);
        assert_eq!(totals.deleted, 1);
        assert_eq!(report.failed_tables(), 1);
    }

    #[test]
    fn test_skipped_report() {
        let report = CycleReport::skipped(Uuid::new_v4());
        assert!(report.skipped);
        assert!(!report.is_success());
        assert!(report.to_string().ends_with("skipped"));
    }

    #[test]
    fn test_status_default() {
        let status = IntegratorStatus::default();
        assert!(status.last_run.is_none());
        assert!(status.tables.is_empty());
        assert!(!status.session_present);
    }
}
