//! DriveMirror daemon (drivemirrord)
//!
//! Mirrors one account's drive into a local directory. On start it:
//!
//! 1. Loads the YAML configuration and the accounts document
//! 2. Opens the snapshot database and restores the namespace tree
//! 3. Watches the mirror directory for local changes
//! 4. Runs the reconciliation, usage and change-event loops until SIGTERM
//!    or SIGINT cancels the shared `CancellationToken`
//!
//! The OAuth flow is not part of the daemon. It reads an access token from
//! `DRIVEMIRROR_ACCESS_TOKEN` or from the configured token file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use drivemirror_cache::{DatabasePool, SqliteSnapshotStore};
use drivemirror_core::accounts::AccountStore;
use drivemirror_core::config::Config;
use drivemirror_drive::client::DriveClient;
use drivemirror_drive::provider::DriveRemoteStore;
use drivemirror_sync::coordinator::{CoordinatorOptions, SyncCoordinator};
use drivemirror_sync::watcher::{ChangeEvent, FileWatcher};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding an access token
const TOKEN_ENV: &str = "DRIVEMIRROR_ACCESS_TOKEN";

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "drivemirrord", version, about = "Mirror a cloud drive into a local directory")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account to mirror; overrides `auth.identity`
    #[arg(short, long)]
    identity: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

// ============================================================================
// DaemonService
// ============================================================================

struct DaemonService {
    coordinator: Arc<SyncCoordinator>,
    /// Kept alive for the lifetime of the service
    _watcher: FileWatcher,
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: CancellationToken,
}

impl DaemonService {
    async fn new(config: &Config, identity: Option<&str>, shutdown: CancellationToken) -> Result<Self> {
        let accounts = AccountStore::open(
            &config.paths.accounts_file,
            &config.paths.base_mirror_directory,
        )
        .context("Failed to load accounts document")?;
        let identity = accounts
            .resolve_identity(identity.or(config.auth.identity.as_deref()))
            .context("No account to mirror; set auth.identity or pass --identity")?;
        info!(identity = %identity, accounts = %accounts.path().display(), "Loaded accounts");

        let token = load_access_token(config)?;
        let client = DriveClient::with_base_url(token, config.drive.base_url.as_str())
            .with_timeout(Duration::from_secs(config.drive.request_timeout_secs))
            .context("Failed to build HTTP client")?;
        let store = Arc::new(DriveRemoteStore::new(client));

        let pool = DatabasePool::new(&config.paths.snapshot_db)
            .await
            .context("Failed to open snapshot database")?;
        let snapshots = Arc::new(SqliteSnapshotStore::new(pool.pool().clone()));

        let coordinator = SyncCoordinator::new(
            identity,
            store,
            snapshots,
            accounts,
            CoordinatorOptions::from(config),
        )
        .await
        .context("Failed to initialise sync coordinator")?;

        let mirror = coordinator.mirror_directory().to_path_buf();
        std::fs::create_dir_all(&mirror)
            .with_context(|| format!("Failed to create mirror directory {}", mirror.display()))?;
        let (mut watcher, events) = FileWatcher::new()?;
        watcher.watch(&mirror)?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            _watcher: watcher,
            events,
            shutdown,
        })
    }

    /// Run every loop until shutdown
    async fn run(self) -> Result<()> {
        let Self {
            coordinator,
            _watcher,
            events,
            shutdown,
        } = self;

        info!(
            identity = coordinator.identity(),
            mirror = %coordinator.mirror_directory().display(),
            "Daemon running"
        );

        let status = tokio::spawn(log_status(coordinator.subscribe(), shutdown.clone()));

        tokio::join!(
            coordinator.run_sync_loop(shutdown.clone()),
            coordinator.run_usage_loop(shutdown.clone()),
            coordinator.run_event_loop(events, shutdown.clone()),
        );

        if let Err(e) = status.await {
            warn!(error = %e, "Status logger ended abnormally");
        }
        Ok(())
    }
}

/// Mirror status events into the log
async fn log_status(mut rx: broadcast::Receiver<drivemirror_core::ports::StatusEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => info!(target: "drivemirror::status", "{event}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status logger fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
}

// ============================================================================
// Startup helpers
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map_or_else(Config::default_path, Path::to_path_buf);
    let config = if path.exists() {
        Config::load(&path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        Config::default()
    };

    let problems = config.validate();
    if !problems.is_empty() {
        let joined = problems
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        bail!("Invalid configuration in {}: {}", path.display(), joined);
    }
    Ok(config)
}

fn load_access_token(config: &Config) -> Result<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    let Some(path) = &config.auth.token_file else {
        bail!("No access token: set {TOKEN_ENV} or auth.token_file");
    };
    let token = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file {}", path.display()))?;
    let token = token.trim();
    if token.is_empty() {
        bail!("Token file {} is empty", path.display());
    }
    Ok(token.to_string())
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_tracing(&config.logging.level, args.json_logs);
    info!("DriveMirror daemon starting (drivemirrord)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(&config, args.identity.as_deref(), shutdown_token).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("DriveMirror daemon shut down gracefully"),
        Err(e) => error!(error = %e, "DriveMirror daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
