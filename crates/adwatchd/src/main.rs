//! adwatchd - ad watching and earnings service
//!
//! This is the main entry point. It:
//! - Loads configuration
//! - Opens the store and syncs the ad catalog
//! - Serves the HTTP API until a shutdown signal arrives

use adwatch_config::load_config;
use adwatch_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use adwatch_util::{DATABASE_FILENAME, default_config_path};
use adwatchd::{AppState, router};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// adwatchd - ad watching and earnings service
#[derive(Parser, Debug)]
#[command(name = "adwatchd")]
#[command(about = "Ad watching, view crediting and earnings service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/adwatchd/config.toml)
    #[arg(short, long, env = "ADWATCH_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ADWATCH_DATA_DIR env var)
    #[arg(short, long, env = "ADWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Listen address override (or set ADWATCH_LISTEN env var)
    #[arg(long, env = "ADWATCH_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Resolves on SIGTERM, SIGINT or SIGHUP
async fn shutdown_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
        _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let policy = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        ad_count = policy.ads.len(),
        session_mode = policy.service.session_mode.as_str(),
        "Configuration loaded"
    );

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.service.data_dir.clone());
    let listen_addr = args.listen.unwrap_or(policy.service.listen_addr);

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join(DATABASE_FILENAME);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );

    info!(db_path = %db_path.display(), "Store initialized");

    store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

    let synced = store
        .sync_catalog(&policy.ads)
        .context("Failed to sync ad catalog")?;
    info!(
        upserted = synced.upserted,
        deactivated = synced.deactivated,
        "Ad catalog synced"
    );
    store.append_audit(AuditEvent::new(AuditEventType::CatalogSynced {
        ad_count: synced.upserted,
        deactivated: synced.deactivated,
    }))?;

    let state = Arc::new(AppState::from_policy(&policy, store.clone()));
    let app = router(state);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    info!(listen_addr = %listen_addr, "Service running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = shutdown_signal().await {
                warn!(error = %e, "Signal handling unavailable");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("HTTP server failed")?;

    if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
        warn!(error = %e, "Failed to log service stop");
    }

    info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "adwatchd starting");

    if adwatch_util::is_mock_time_active() {
        warn!(now = %adwatch_util::now(), "Mock time is active; cooldowns and daily totals use the shifted clock");
    }

    run(args).await
}
