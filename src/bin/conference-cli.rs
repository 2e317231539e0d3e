//! Conference data CLI
//!
//! Runs sync passes against a manifest URL into a local SQLite database and
//! prints a short summary of what is stored.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use conference_sdk_core_rust::conf::sync::SyncReport;
use conference_sdk_core_rust::{
    create_sqlite_pool_with_migration, ContentFetcher, FetcherConfig, ScheduleQueries,
    ScheduleStore, SearchIndexUpdater, SyncConfig, SyncIntervalPolicy, SyncMetadataDao,
    SyncOrchestrator, SyncTrigger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "conference-cli")]
#[command(about = "Sync conference data into a local SQLite store", long_about = None)]
struct Args {
    /// Manifest URL listing the data files
    #[arg(short, long)]
    manifest_url: String,

    /// SQLite database URL
    #[arg(long, default_value = "sqlite://conference.db?mode=rwc")]
    db: String,

    /// Directory for the content-addressed data file cache
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// File whose content, if present, replaces the manifest URL
    #[arg(long)]
    manifest_override: Option<PathBuf>,

    /// Seed data imported on first run
    #[arg(long)]
    bootstrap: Option<PathBuf>,

    /// RFC1123 timestamp of the seed data
    #[arg(long)]
    bootstrap_timestamp: Option<String>,

    /// First conference day (YYYY-MM-DD)
    #[arg(long)]
    conference_start: Option<NaiveDate>,

    /// Last conference day (YYYY-MM-DD)
    #[arg(long)]
    conference_end: Option<NaiveDate>,

    /// Keep running scheduled passes until Ctrl+C
    #[arg(short, long)]
    watch: bool,

    /// Log filter (default: info,conference_sdk_core_rust=debug)
    #[arg(long, default_value = "info,conference_sdk_core_rust=debug")]
    log_level: String,
}

/// Log to stdout and to sync.log
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG wins over the command line
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("sync.log")
        .context("cannot open sync.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] logging to stdout and sync.log");
    Ok(())
}

fn day_start_millis(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).timestamp_millis())
        .unwrap_or_default()
}

fn interval_policy(args: &Args) -> SyncIntervalPolicy {
    match (args.conference_start, args.conference_end) {
        (Some(start), Some(end)) => {
            let end_millis = end
                .succ_opt()
                .map(day_start_millis)
                .unwrap_or_else(|| day_start_millis(end))
                - 1;
            SyncIntervalPolicy::new(day_start_millis(start), end_millis)
        }
        // no dates: always the "long before" cadence
        _ => SyncIntervalPolicy::new(i64::MAX / 2, i64::MAX / 2),
    }
}

fn print_report(report: &SyncReport) {
    info!(
        "[CLI] pass {:?}: bootstrapped={}, conference={:?}, user data={:?}, feedback={:?}",
        report.trigger, report.bootstrapped, report.conference, report.user_data, report.feedback
    );
    info!(
        "[CLI] consecutive failures {}, next pass in {:?}",
        report.consecutive_failures, report.next_delay
    );
}

async fn print_summary(queries: &ScheduleQueries) -> Result<()> {
    let sessions = queries.sessions().await?;
    info!(
        "[CLI] store holds {} sessions, {} speakers, {} rooms, {} tags, {} blocks",
        sessions.len(),
        queries.speakers().await?.len(),
        queries.rooms().await?.len(),
        queries.tags().await?.len(),
        queries.blocks().await?.len()
    );
    for session in sessions.iter().take(5) {
        info!("[CLI]   - {} | {}", session.id, session.title);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    info!("[CLI] manifest {}", args.manifest_url);
    let pool = create_sqlite_pool_with_migration(&args.db).await?;

    let mut fetcher_config = FetcherConfig::new(args.manifest_url.clone(), args.cache_dir.clone());
    fetcher_config.manifest_override_file = args.manifest_override.clone();
    let fetcher = ContentFetcher::new(fetcher_config)?;

    let store = Arc::new(
        ScheduleStore::new(pool.clone())
            .with_listener(Arc::new(SearchIndexUpdater::new(pool.clone()))),
    );

    let mut config = SyncConfig::new(interval_policy(&args));
    config.bootstrap_data_file = args.bootstrap.clone();
    if let Some(ts) = &args.bootstrap_timestamp {
        config.bootstrap_timestamp = ts.clone();
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        config,
        fetcher,
        store,
        SyncMetadataDao::new(pool.clone()),
    ));
    info!("[CLI] sync state: {}", orchestrator.restore_state().await);
    let queries = ScheduleQueries::new(pool);

    if args.watch {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_periodic(shutdown_rx).await })
        };
        info!("[CLI] watching, press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        orchestrator.request_cancel();
        let _ = shutdown_tx.send(true);
        if let Err(e) = runner.await {
            error!("[CLI] sync task ended abnormally: {}", e);
        }
    } else {
        let report = orchestrator.sync(SyncTrigger::Manual).await?;
        print_report(&report);
    }

    print_summary(&queries).await
}
