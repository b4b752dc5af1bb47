//! SkyBlock Orchestrator - Supervise a local fleet of proxy, limbo, service and game-server processes
//!
//! Launches each unit as a `java -jar` child process, remembers every instance it has
//! started, and exposes start/stop/remove, status, logs, downloads and shared config
//! editing over HTTP with a WebSocket push channel for status changes.

mod api;
mod assets;
mod bootstrap;
mod core;
mod platform;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use single_instance::SingleInstance;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::AppState;
use crate::assets::{layout, ConfigFiles, DownloadCoordinator};
use crate::core::settings::SETTINGS_FILE;
use crate::core::{Broadcaster, Catalog, Settings, Supervisor};

/// Application name constant
pub const APP_NAME: &str = "skyblock-orchestrator";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const LOG_FILE: &str = "orchestrator.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DownloadMode {
    /// Fetch only jars not already cached or in place
    Missing,
    /// Re-fetch and overwrite every jar
    Force,
}

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about)]
struct Cli {
    /// Directory holding proxy/, limbo/, services/, gameserver/ and configuration/
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Settings file (defaults to orchestrator.toml in the base directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Java binary used to launch every unit
    #[arg(long)]
    java: Option<PathBuf>,

    /// Seconds to wait after SIGTERM before killing a unit
    #[arg(long)]
    stop_timeout: Option<u32>,

    #[arg(long)]
    settle_delay_ms: Option<u32>,

    #[arg(long)]
    service_stagger_ms: Option<u32>,

    #[arg(long)]
    server_stagger_ms: Option<u32>,

    #[arg(long)]
    release_url: Option<String>,

    /// Download jars before serving
    #[arg(long, value_enum)]
    download: Option<DownloadMode>,

    /// Start the default fleet once the API is up
    #[arg(long)]
    autostart: bool,

    /// Do not kill stray `java -jar` processes on shutdown
    #[arg(long)]
    no_sweep: bool,
}

impl Cli {
    /// Settings file first, then command line overrides
    fn settings(&self) -> Result<Settings> {
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to resolve working directory")?,
        };
        let path = self.config.clone().unwrap_or_else(|| base.join(SETTINGS_FILE));
        let mut settings = Settings::load(&path)?;

        if settings.base_directory.is_none() || self.base_dir.is_some() {
            settings.base_directory = Some(base);
        }
        if let Some(bind) = &self.bind {
            settings.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(java) = &self.java {
            settings.java_path = java.clone();
        }
        if let Some(timeout) = self.stop_timeout {
            settings.stop_timeout_secs = timeout;
        }
        if let Some(delay) = self.settle_delay_ms {
            settings.settle_delay_ms = delay;
        }
        if let Some(stagger) = self.service_stagger_ms {
            settings.service_stagger_ms = stagger;
        }
        if let Some(stagger) = self.server_stagger_ms {
            settings.server_stagger_ms = stagger;
        }
        if let Some(url) = &self.release_url {
            settings.release_base_url = url.clone();
        }
        if self.no_sweep {
            settings.sweep_leftovers = false;
        }
        settings.validate();
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    let base_dir = settings.get_base_directory();
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("Failed to create {}", base_dir.display()))?;

    // Initialize logging
    let _log_guard = init_logging(&base_dir);

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Only one orchestrator may manage a given base directory
    let instance = SingleInstance::new(&lock_name(&base_dir))
        .context("Failed to create single instance lock")?;
    if !instance.is_single() {
        error!(
            "Another instance of {} is already managing {}",
            APP_NAME,
            base_dir.display()
        );
        return Ok(());
    }

    let catalog = Catalog::default();
    let downloads = DownloadCoordinator::new(catalog, settings.clone())?;
    prepare_layout(&settings, &downloads, cli.download).await?;

    let supervisor = Supervisor::new(catalog, settings.clone(), Broadcaster::new(Handle::current()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if cli.autostart {
        let supervisor = supervisor.clone();
        let shutdown = shutdown_rx.clone();
        tokio::task::spawn_blocking(move || bootstrap::autostart(&supervisor, &shutdown));
    }

    let state = AppState {
        supervisor: supervisor.clone(),
        downloads,
        config: Arc::new(ConfigFiles::new(settings.config_dir())),
        shutdown: shutdown_rx,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind((settings.bind_address.as_str(), settings.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", settings.bind_address, settings.port))?;
    info!("Control API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Control API failed")?;

    info!("{} shutting down", APP_NAME);
    tokio::task::spawn_blocking(move || supervisor.shutdown()).await??;
    Ok(())
}

/// Fetch jars if asked, then lay out the working directories
async fn prepare_layout(
    settings: &Settings,
    downloads: &DownloadCoordinator,
    mode: Option<DownloadMode>,
) -> Result<()> {
    let Some(mode) = mode else {
        info!("Skipping download, using existing files");
        layout::setup_directories(settings, true)?;
        layout::sync_shared_files(settings)?;
        return Ok(());
    };

    let force = mode == DownloadMode::Force;
    if force {
        info!("Force redownloading all files");
        let services = settings.services_dir();
        if services.exists() {
            std::fs::remove_dir_all(&services)
                .with_context(|| format!("Failed to clear {}", services.display()))?;
        }
    } else {
        info!("Downloading only missing files");
    }

    let state = downloads.download(None, force).await?;
    for failure in &state.errors {
        warn!("{}", failure);
    }
    layout::setup_directories(settings, false)
}

/// Lock name unique to the managed base directory
fn lock_name(base_dir: &std::path::Path) -> String {
    let mut hasher = DefaultHasher::new();
    base_dir.hash(&mut hasher);
    format!("{}-{:016x}", APP_NAME, hasher.finish())
}

/// Initialize the logging system: stdout plus a plain-text file in the base directory
fn init_logging(base_dir: &std::path::Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("skyblock_orchestrator=info,tower_http=warn"));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(base_dir, LOG_FILE));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
