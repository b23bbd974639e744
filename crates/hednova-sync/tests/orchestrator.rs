//! Cycle orchestrator against a scripted report source and a file database.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

use hednova_core::{builtin_spec, RemoteRow, SyncResult};
use hednova_db::{Database, DbConfig};
use hednova_sync::{
    CycleObserver, CycleOrchestrator, CycleReport, FeedConfig, FetchOutcome, FetchRequest,
    IntegrationError, IntegrationResult, IntegratorConfig, ReportSource,
};

// =============================================================================
// Scripted Source
// =============================================================================

#[derive(Default)]
struct FakeSource {
    logins: Mutex<VecDeque<IntegrationResult<String>>>,
    outcomes: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
    requests: Mutex<Vec<FetchRequest>>,
    auth_calls: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeSource {
    fn new() -> Self {
        Self::default()
    }

    /// Fetches block until `release` is notified, after signalling `entered`.
    fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        FakeSource {
            gate: Some((entered, release)),
            ..Self::default()
        }
    }

    fn login(&self, result: IntegrationResult<String>) {
        self.logins.lock().unwrap().push_back(result);
    }

    fn respond(&self, report: &str, outcome: FetchOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(report.to_string())
            .or_default()
            .push_back(outcome);
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportSource for FakeSource {
    async fn authenticate(&self) -> IntegrationResult<String> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("SESS123".to_string()))
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        self.requests.lock().unwrap().push(request.clone());

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .get_mut(&request.report_code)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| FetchOutcome::success(Vec::new()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("hednova.db")
}

fn config(dir: &TempDir, feeds: Vec<FeedConfig>) -> IntegratorConfig {
    let mut config = IntegratorConfig::default();
    config.integrator.username = "ws".into();
    config.integrator.password = "pw".into();
    config.integrator.api_key = "api".into();
    config.integrator.company = "4".into();
    config.integrator.period = "2".into();
    config.database.url = Some(format!("sqlite://{}?mode=rwc", db_path(dir).display()));
    config.feeds = feeds;
    config
}

fn incremental(code: &str) -> FeedConfig {
    let mut feed = FeedConfig::builtin(code);
    feed.incremental = true;
    feed
}

fn row(key: &str, kod: &str, aciklama: &str) -> RemoteRow {
    RemoteRow::new()
        .with("key", key)
        .with("kod", kod)
        .with("aciklama", aciklama)
}

async fn open(dir: &TempDir) -> Database {
    Database::new(DbConfig::new(db_path(dir))).await.unwrap()
}

async fn count(dir: &TempDir, code: &str) -> i64 {
    let db = open(dir).await;
    let n = db.mirror().count(&builtin_spec(code).unwrap()).await.unwrap();
    db.close().await;
    n
}

fn orchestrator(config: IntegratorConfig, source: &Arc<FakeSource>) -> CycleOrchestrator {
    let source: Arc<dyn ReportSource> = source.clone();
    CycleOrchestrator::new(config, source).unwrap()
}

// =============================================================================
// Cycles
// =============================================================================

#[tokio::test]
async fn test_end_to_end_insert_then_replace() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond(
        "ENT-04",
        FetchOutcome::success(vec![row("10", "A", "Alpha"), row("11", "B", "Beta")]),
    );
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A2", "Alpha2")]));

    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);

    let first = orchestrator.run_cycle().await;
    assert!(first.is_success(), "errors: {:?}", first.errors);
    assert!(first.session_present);
    assert_eq!(first.tables.len(), 1);
    assert_eq!(
        (first.tables[0].inserted, first.tables[0].updated, first.tables[0].deleted),
        (2, 0, 0)
    );

    let second = orchestrator.run_cycle().await;
    assert!(second.is_success(), "errors: {:?}", second.errors);
    assert_eq!(
        (second.tables[0].inserted, second.tables[0].updated, second.tables[0].deleted),
        (0, 1, 1)
    );

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.token == "SESS123"));
    assert_eq!(requests[0].company, "4");

    let db = open(&dir).await;
    assert_eq!(
        db.session_store().get_active_token().await.unwrap(),
        Some("SESS123".to_string())
    );
    let survivor: (String, String) =
        sqlx::query_as(r#"SELECT "KOD", "AD" FROM "KR_IMLT00" WHERE "ENT01" = '10'"#)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(survivor, ("A2".to_string(), "Alpha2".to_string()));
    assert!(db.feeds().last_success("ENT-04").await.unwrap().is_some());
    db.close().await;

    let status = orchestrator.status().await;
    assert!(status.last_run.is_some());
    assert!(status.session_present);
    assert_eq!(status.tables["KR_IMLT00"].updated, 1);
    assert_eq!(status.last_report.unwrap().cycle_id, second.cycle_id);
}

#[tokio::test]
async fn test_session_rejection_reauthenticates_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.login(Ok("OLD".into()));
    source.login(Ok("NEW".into()));
    source.respond("ENT-04", FetchOutcome::rejected("401", "session expired"));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));

    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);
    let report = orchestrator.run_cycle().await;

    assert!(report.is_success(), "errors: {:?}", report.errors);
    assert_eq!(report.tables[0].inserted, 1);
    assert_eq!(source.auth_calls(), 2);

    let tokens: Vec<String> = source.requests().into_iter().map(|r| r.token).collect();
    assert_eq!(tokens, vec!["OLD".to_string(), "NEW".to_string()]);

    let db = open(&dir).await;
    assert_eq!(
        db.session_store().get_active_token().await.unwrap(),
        Some("NEW".to_string())
    );
    db.close().await;
}

#[tokio::test]
async fn test_repeated_rejection_fails_the_feed() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond("ENT-04", FetchOutcome::rejected("401", "expired"));
    source.respond("ENT-04", FetchOutcome::rejected("401", "expired"));

    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);
    let report = orchestrator.run_cycle().await;

    assert_eq!(source.requests().len(), 2);
    assert_eq!(report.tables.len(), 1);
    assert!(!report.tables[0].is_success());
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_auth_failure_falls_back_to_stored_token() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.login(Ok("SESS123".into()));
    source.login(Err(IntegrationError::Auth {
        code: "500".into(),
        message: "maintenance".into(),
    }));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));

    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);
    assert!(orchestrator.run_cycle().await.is_success());

    let report = orchestrator.run_cycle().await;
    assert!(report.session_present);
    assert!(report.errors[0].starts_with("authentication"));
    assert!(report.tables[0].is_success());
    assert_eq!(source.requests()[1].token, "SESS123");
}

#[tokio::test]
async fn test_no_session_skips_all_feeds() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.login(Err(IntegrationError::Transport("connection refused".into())));

    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);
    let report = orchestrator.run_cycle().await;

    assert!(!report.session_present);
    assert!(report.tables.is_empty());
    assert!(!report.errors.is_empty());
    assert!(source.requests().is_empty());
    assert!(!orchestrator.status().await.session_present);
}

#[tokio::test]
async fn test_failed_feed_does_not_stop_the_cycle() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond("ENT-04", FetchOutcome::transport_failure("timed out"));
    source.respond("ENT-07", FetchOutcome::success(vec![row("C1", "120.01", "Acme")]));

    let orchestrator = orchestrator(
        config(&dir, vec![FeedConfig::builtin("ENT-04"), FeedConfig::builtin("ENT-07")]),
        &source,
    );
    let report = orchestrator.run_cycle().await;

    assert_eq!(report.tables.len(), 2);
    assert_eq!(report.tables[0], SyncResult::failure("KR_IMLT00", "Transport error: timed out"));
    assert!(report.tables[1].is_success());
    assert_eq!(report.tables[1].inserted, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("ENT-04"));

    let db = open(&dir).await;
    assert!(db.feeds().last_success("ENT-04").await.unwrap().is_none());
    assert!(db.feeds().last_success("ENT-07").await.unwrap().is_some());
    db.close().await;
}

#[tokio::test]
async fn test_incremental_feed_sends_since_and_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond(
        "RPR-10",
        FetchOutcome::success(vec![row("1", "S-1", ""), row("2", "S-2", "")]),
    );
    source.respond("RPR-10", FetchOutcome::success(vec![row("2", "S-2b", "")]));

    let mut feed = incremental("ENT-10");
    feed.report_code = Some("RPR-10".into());
    let orchestrator = orchestrator(config(&dir, vec![feed]), &source);

    let first = orchestrator.run_cycle().await;
    assert_eq!(first.tables[0].inserted, 2);

    let second = orchestrator.run_cycle().await;
    assert_eq!(
        (second.tables[0].inserted, second.tables[0].updated, second.tables[0].deleted),
        (0, 1, 0)
    );
    assert_eq!(count(&dir, "ENT-10").await, 2);

    let requests = source.requests();
    assert_eq!(requests[0].params.get("tarihsaat"), Some(&Value::Null));
    let since = requests[1].params.get("tarihsaat").and_then(Value::as_str).unwrap();
    assert_eq!(since.len(), "2026-01-01 00:00:00".len());
}

#[tokio::test]
async fn test_detail_feed_requests_sub_report() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());

    let mut feed = FeedConfig::builtin("ENT-02");
    feed.detail = Some("D-0001".into());
    let orchestrator = orchestrator(config(&dir, vec![feed]), &source);
    orchestrator.run_cycle().await;

    assert_eq!(source.requests()[0].detail.as_deref(), Some("D-0001"));
}

#[tokio::test]
async fn test_unreachable_database_is_reported() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    let mut config = config(&dir, vec![FeedConfig::builtin("ENT-04")]);
    config.database.url = Some(format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("missing").join("nested").join("h.db").display()
    ));

    let orchestrator = orchestrator(config, &source);
    let report = orchestrator.run_cycle().await;

    assert!(!report.skipped);
    assert!(report.tables.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(source.auth_calls(), 0);
}

#[tokio::test]
async fn test_refreshed_token_is_used_when_store_fails() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir).await;
    sqlx::query("DROP TABLE integration_session")
        .execute(db.pool())
        .await
        .unwrap();
    db.close().await;

    let source = Arc::new(FakeSource::new());
    source.login(Ok("OLD".into()));
    source.login(Ok("NEW".into()));
    source.respond("ENT-04", FetchOutcome::rejected("401", "session expired"));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));
    source.respond("ENT-07", FetchOutcome::success(vec![row("1", "C1", "Cari")]));

    let orchestrator = orchestrator(
        config(&dir, vec![FeedConfig::builtin("ENT-04"), FeedConfig::builtin("ENT-07")]),
        &source,
    );
    let report = orchestrator.run_cycle().await;

    assert!(report.tables.iter().all(|t| t.is_success()), "{:?}", report.tables);
    let tokens: Vec<String> = source.requests().into_iter().map(|r| r.token).collect();
    assert_eq!(tokens, vec!["OLD", "NEW", "NEW"]);
    assert_eq!(
        report.errors.iter().filter(|e| e.starts_with("session store")).count(),
        2
    );
}

// =============================================================================
// Single Feed Runs
// =============================================================================

#[tokio::test]
async fn test_run_feed_syncs_one_feed_and_records_success() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond("ENT-07", FetchOutcome::success(vec![row("1", "C1", "Cari")]));

    let observer = Arc::new(CountingObserver::default());
    let source_dyn: Arc<dyn ReportSource> = source.clone();
    let orchestrator = CycleOrchestrator::with_observer(
        config(&dir, vec![FeedConfig::builtin("ENT-04"), FeedConfig::builtin("ENT-07")]),
        source_dyn,
        observer.clone(),
    )
    .unwrap();

    let result = orchestrator.run_feed("ENT-07").await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.inserted, 1);

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].report_code, "ENT-07");
    assert_eq!(count(&dir, "ENT-07").await, 1);
    assert_eq!(count(&dir, "ENT-04").await, 0);

    let db = open(&dir).await;
    assert!(db.feeds().last_success("ENT-07").await.unwrap().is_some());
    assert!(db.feeds().last_success("ENT-04").await.unwrap().is_none());
    db.close().await;

    assert_eq!(observer.tables.load(Ordering::SeqCst), 1);
    assert_eq!(observer.started.load(Ordering::SeqCst), 0);
    let status = orchestrator.status().await;
    assert_eq!(status.tables["KR_CARI00"].inserted, 1);
    assert!(status.last_report.is_none());
}

#[tokio::test]
async fn test_run_feed_rejects_unknown_code() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);

    assert!(matches!(
        orchestrator.run_feed("ENT-99").await,
        Err(IntegrationError::UnknownFeed(code)) if code == "ENT-99"
    ));
    assert_eq!(source.auth_calls(), 0);
}

#[tokio::test]
async fn test_run_feed_without_session_fails() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.login(Err(IntegrationError::Transport("connection refused".into())));
    let orchestrator = orchestrator(config(&dir, vec![FeedConfig::builtin("ENT-04")]), &source);

    assert!(matches!(
        orchestrator.run_feed("ENT-04").await,
        Err(IntegrationError::NoSession)
    ));
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn test_run_feed_refused_while_cycle_in_flight() {
    let dir = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(FakeSource::gated(entered.clone(), release.clone()));

    let orchestrator = Arc::new(orchestrator(
        config(&dir, vec![FeedConfig::builtin("ENT-04")]),
        &source,
    ));
    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_cycle().await })
    };

    entered.notified().await;
    assert!(matches!(
        orchestrator.run_feed("ENT-04").await,
        Err(IntegrationError::Busy)
    ));

    release.notify_one();
    assert!(!background.await.unwrap().skipped);
    assert_eq!(source.requests().len(), 1);
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let dir = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(FakeSource::gated(entered.clone(), release.clone()));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));

    let orchestrator = Arc::new(orchestrator(
        config(&dir, vec![FeedConfig::builtin("ENT-04")]),
        &source,
    ));

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_cycle().await })
    };

    entered.notified().await;
    assert!(orchestrator.is_running());

    let overlapping = orchestrator.run_cycle().await;
    assert!(overlapping.skipped);
    assert!(overlapping.tables.is_empty());

    release.notify_one();
    let first = background.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.tables[0].inserted, 1);
    assert!(!orchestrator.is_running());
    assert_eq!(source.requests().len(), 1);
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    tables: AtomicUsize,
    finished: AtomicUsize,
}

impl CycleObserver for CountingObserver {
    fn cycle_started(&self, _cycle_id: Uuid) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn table_synced(&self, _feed_code: &str, _result: &SyncResult) {
        self.tables.fetch_add(1, Ordering::SeqCst);
    }

    fn cycle_finished(&self, _report: &CycleReport) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_start_runs_immediately_and_stop_ends_schedule() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new());
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));

    let observer = Arc::new(CountingObserver::default());
    let source_dyn: Arc<dyn ReportSource> = source.clone();
    let mut orchestrator = CycleOrchestrator::with_observer(
        config(&dir, vec![FeedConfig::builtin("ENT-04")]),
        source_dyn,
        observer.clone(),
    )
    .unwrap();

    orchestrator.start_with_interval(Duration::from_secs(3600));
    assert!(orchestrator.is_scheduled());

    // Second start is a no-op.
    orchestrator.start_with_interval(Duration::from_secs(1));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while observer.finished.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "first cycle never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    orchestrator.stop().await;
    assert!(!orchestrator.is_scheduled());

    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.tables.load(Ordering::SeqCst), 1);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    assert_eq!(count(&dir, "ENT-04").await, 1);

    let status = orchestrator.status().await;
    assert!(status.last_run.is_some());
    assert_eq!(status.tables["KR_IMLT00"].inserted, 1);
}

#[tokio::test]
async fn test_stop_lets_in_flight_cycle_commit() {
    let dir = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(FakeSource::gated(entered.clone(), release.clone()));
    source.respond("ENT-04", FetchOutcome::success(vec![row("10", "A", "Alpha")]));

    let observer = Arc::new(CountingObserver::default());
    let source_dyn: Arc<dyn ReportSource> = source.clone();
    let mut orchestrator = CycleOrchestrator::with_observer(
        config(&dir, vec![FeedConfig::builtin("ENT-04")]),
        source_dyn,
        observer.clone(),
    )
    .unwrap();

    orchestrator.start_with_interval(Duration::from_millis(50));
    entered.notified().await;

    let stopping = tokio::spawn(async move {
        orchestrator.stop().await;
        orchestrator
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!stopping.is_finished(), "stop returned before the cycle ended");
    assert_eq!(count(&dir, "ENT-04").await, 0);

    release.notify_one();
    let orchestrator = stopping.await.unwrap();
    assert!(!orchestrator.is_scheduled());

    assert_eq!(count(&dir, "ENT-04").await, 1);
    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    assert_eq!(source.requests().len(), 1);

    let report = orchestrator.status().await.last_report.unwrap();
    assert!(report.is_success(), "errors: {:?}", report.errors);
    assert_eq!(report.tables[0].inserted, 1);
}

#[test]
fn test_orchestrator_rejects_empty_feed_list() {
    let dir = TempDir::new().unwrap();
    let source: Arc<dyn ReportSource> = Arc::new(FakeSource::new());

    let mut disabled = FeedConfig::builtin("ENT-04");
    disabled.enabled = false;

    assert!(matches!(
        CycleOrchestrator::new(config(&dir, vec![disabled]), source),
        Err(IntegrationError::InvalidConfig(_))
    ));
}

#[test]
fn test_request_param_helper_shape() {
    let request = FetchRequest::new("R", "T", "4", "2").param("tarihsaat", json!(null));
    assert_eq!(request.params.get("tarihsaat"), Some(&Value::Null));
}
