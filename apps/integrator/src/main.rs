//! # Hednova Integrator
//!
//! Mirrors DIA report snapshots into the Hednova database on a fixed
//! interval.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize tracing (RUST_LOG, default info,hednova=debug,sqlx=warn)│
//! │  2. Load IntegratorConfig (file → env → validate)                      │
//! │  3. Build DiaClient + CycleOrchestrator (feed registry validated)      │
//! │  4a. --once: run one cycle, exit non-zero if anything failed           │
//! │      --feed CODE: sync one feed the same way                           │
//! │  4b. default: start schedule, wait for Ctrl+C / SIGTERM, stop          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hednova_core::{builtin_title, SyncResult, BUILTIN_CODES};
use hednova_sync::{CycleOrchestrator, CycleReport, DiaClient, IntegratorConfig};

#[derive(Parser)]
#[command(name = "hednova-integrator")]
#[command(about = "Mirror DIA ERP reports into the Hednova database")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Synchronize one feed by code and exit
    #[arg(long, value_name = "CODE", conflicts_with = "once")]
    feed: Option<String>,

    /// Override the cycle interval in minutes
    #[arg(long)]
    interval: Option<u64>,

    /// Validate the configuration, print the resolved feeds and exit
    #[arg(long)]
    check: bool,

    /// Print the built-in feed catalog and exit
    #[arg(long)]
    list_feeds: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    if cli.list_feeds {
        for code in BUILTIN_CODES {
            println!("{}\t{}", code, builtin_title(code).unwrap_or_default());
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Integrator failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = IntegratorConfig::load(cli.config)?;
    if let Some(minutes) = cli.interval {
        config.schedule.interval_minutes = minutes;
        config.validate()?;
    }

    info!(
        company = %config.integrator.company,
        period = %config.integrator.period,
        interval_minutes = config.schedule.interval_minutes,
        "Configuration loaded"
    );

    let client = Arc::new(DiaClient::new(&config)?);
    let interval = config.interval();
    let mut orchestrator = CycleOrchestrator::new(config, client)?;

    if cli.check {
        for feed in orchestrator.registry().iter() {
            println!(
                "{}\t{}\t{}\t{}{}",
                feed.code,
                feed.report_code,
                feed.spec.table,
                feed.title,
                if feed.incremental { "\t(incremental)" } else { "" }
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(code) = cli.feed.as_deref() {
        let result = orchestrator.run_feed(code).await?;
        log_table(&result);
        return Ok(if result.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    if cli.once {
        let report = orchestrator.run_cycle().await;
        log_report(&report);
        return Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    orchestrator.start_with_interval(interval);
    shutdown_signal().await;
    orchestrator.stop().await;

    let status = orchestrator.status().await;
    if let Some(report) = &status.last_report {
        info!(summary = %report, "Last cycle");
    }

    info!("Integrator stopped");
    Ok(ExitCode::SUCCESS)
}

fn log_report(report: &CycleReport) {
    for table in &report.tables {
        log_table(table);
    }
    for err in &report.errors {
        warn!(error = %err, "Cycle error");
    }
    info!(summary = %report, "Cycle finished");
}

fn log_table(result: &SyncResult) {
    if result.is_success() {
        info!(result = %result, "Table synchronized");
    } else {
        warn!(result = %result, "Table failed");
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=hednova=trace` - Trace the hednova crates only
/// - Default: `info,hednova=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hednova=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping after the current cycle");
}
