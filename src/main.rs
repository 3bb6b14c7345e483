use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scrobble_mirror::background_jobs::{create_scheduler, jobs::ScrobbleSyncJob};
use scrobble_mirror::cli_style::{get_styles, print_error, print_success, print_warning};
use scrobble_mirror::config::{
    locate_config_file, AppConfig, CliConfig, FileConfig, DEFAULT_PAGE_SIZE,
    DEFAULT_REQUEST_TIMEOUT_SEC,
};
use scrobble_mirror::stats::{print_stats, StatsSnapshot};
use scrobble_mirror::sync::{ImportProgress, LogReporter, RetryPolicy, SyncReport, SyncReporter};
use scrobble_mirror::{LastFmClient, SqliteScrobbleStore, SyncEngine, SyncError};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(
    name = "scrobble-mirror",
    about = "Mirror a Last.fm listening history into a local SQLite database",
    styles = get_styles()
)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite scrobble database.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Last.fm user whose history is mirrored.
    #[clap(long, global = true)]
    pub user: Option<String>,

    /// Last.fm API key.
    #[clap(long, global = true)]
    pub api_key: Option<String>,

    /// Records requested per feed page (1-200).
    #[clap(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Timeout of a single feed request in seconds.
    #[clap(long, global = true, default_value_t = DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the whole listening history, oldest first, and store every scrobble.
    Import,
    /// Keep the store in sync by fetching new scrobbles on a fixed interval.
    Daemon,
    /// Print a summary plus recent and top lists from the local store.
    Stats,
    /// Print version information.
    Version,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            lastfm_username: self.user.clone(),
            lastfm_api_key: self.api_key.clone(),
            db_path: self.db_path.clone(),
            page_size: self.page_size,
            request_timeout_sec: self.request_timeout_sec,
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")
}

fn load_config(cli_args: &CliArgs) -> Result<AppConfig> {
    let file_config = match locate_config_file(cli_args.config.as_deref())? {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(&path)?)
        }
        None => None,
    };
    AppConfig::resolve(&cli_args.to_cli_config(), file_config)
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteScrobbleStore>> {
    if let Some(parent) = config
        .db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    info!("Opening scrobble database at {:?}", config.db_path);
    Ok(Arc::new(SqliteScrobbleStore::new(&config.db_path)?))
}

fn build_engine(
    config: &AppConfig,
    store: Arc<SqliteScrobbleStore>,
    reporter: Arc<dyn SyncReporter>,
) -> Result<SyncEngine> {
    let client = LastFmClient::new(config.request_timeout())
        .context("Failed to create Last.fm client")?;
    Ok(
        SyncEngine::new(Arc::new(client), store.clone(), store, config.sync_settings())
            .with_retry_policy(RetryPolicy::new(&config.sync))
            .with_reporter(reporter),
    )
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            token.cancel();
        }
    });
}

fn print_import_summary(report: &SyncReport) {
    print_success(&format!(
        "Imported {} new scrobbles and {} new artists ({} already stored)",
        report.tracks_created, report.artists_created, report.duplicates
    ));
    if report.skipped_bad_timestamp > 0 {
        print_warning(&format!(
            "Skipped {} records with an unreadable timestamp",
            report.skipped_bad_timestamp
        ));
    }
}

async fn run_import(config: &AppConfig, store: Arc<SqliteScrobbleStore>) -> Result<()> {
    let engine = build_engine(config, store, Arc::new(ImportProgress::new()))?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = tokio::task::spawn_blocking(move || engine.import(&cancel))
        .await
        .context("Import task panicked")?;

    match result {
        Ok(report) => {
            print_import_summary(&report);
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            print_warning("Import interrupted; scrobbles stored so far are kept");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Import failed: {}", e));
            Err(e.into())
        }
    }
}

async fn run_daemon(config: &AppConfig, store: Arc<SqliteScrobbleStore>) -> Result<()> {
    let engine = Arc::new(build_engine(config, store, Arc::new(LogReporter))?);
    let interval = Duration::from_secs(config.sync.interval_secs);

    let shutdown_token = CancellationToken::new();
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone());
    scheduler
        .register_job(Arc::new(ScrobbleSyncJob::new(engine, interval)))
        .await;

    info!(
        "Syncing scrobbles of {} every {}s",
        config.lastfm_username, config.sync.interval_secs
    );
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the interrupt signal")?;
    info!("Shutting down...");
    shutdown_token.cancel();
    scheduler_task
        .await
        .context("Scheduler task panicked")?;

    for job in scheduler_handle.list_jobs().await {
        info!(
            "Job {}: last run {}, {} dropped ticks",
            job.id,
            job.last_run
                .map(|run| format!("{} at {}", run.status, run.finished_at))
                .unwrap_or_else(|| "never".to_string()),
            job.dropped_ticks
        );
    }
    Ok(())
}

fn run_stats(config: &AppConfig, store: &SqliteScrobbleStore) -> Result<()> {
    let snapshot = StatsSnapshot::collect(store, &config.stats)?;
    print_stats(&config.lastfm_username, &snapshot);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    if let Command::Version = cli_args.command {
        println!(
            "scrobble-mirror {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    init_tracing()?;

    let config = load_config(&cli_args)?;
    let store = open_store(&config)?;

    match cli_args.command {
        Command::Import => run_import(&config, store).await,
        Command::Daemon => run_daemon(&config, store).await,
        Command::Stats => run_stats(&config, &store),
        Command::Version => Ok(()),
    }
}
