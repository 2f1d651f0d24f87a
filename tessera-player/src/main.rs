//! Tessera Player - Main entry point
//!
//! Runs a playback session for the windows and groups in the configuration
//! file and serves the HTTP control API. Rendering is simulated; a real
//! renderer plugs in through `media::EngineFactory`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tessera_common::EventBus;
use tessera_player::api::{self, AppState};
use tessera_player::config::Config;
use tessera_player::media::{PersistenceStore, Services};
use tessera_player::sim::{MemoryCache, SimBehavior, SimEngineFactory, SimResolver};
use tessera_player::store::{MemoryStore, SqliteStore};
use tessera_player::Session;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for tessera-player
#[derive(Parser, Debug)]
#[command(name = "tessera-player")]
#[command(about = "Synchronized multi-window playback orchestrator")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the HTTP control API
    #[arg(short, long, env = "TESSERA_BIND")]
    bind: Option<SocketAddr>,

    /// Keep positions and shuffle history in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Simulated open latency in milliseconds
    #[arg(long, default_value = "200")]
    sim_open_delay_ms: u64,

    /// Simulated media length in seconds
    #[arg(long, default_value = "30")]
    sim_media_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = tessera_common::config::resolve_config_path(
        args.config.as_deref(),
        tessera_common::config::CONFIG_ENV_VAR,
    );
    let mut config = match &config_path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::load(path).context("Failed to load configuration")?
        }
        None => {
            warn!("No configuration file found, using defaults");
            Config::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    info!(
        "Starting Tessera Player: {} window(s), {} group(s)",
        config.windows.len(),
        config.groups.len()
    );

    let store: Arc<dyn PersistenceStore> = if args.ephemeral {
        info!("Ephemeral mode: persistence kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        let db_path = config.database.resolved_path();
        Arc::new(
            SqliteStore::open(&db_path)
                .await
                .context("Failed to open database")?,
        )
    };

    let cache_root = tessera_common::config::default_data_dir().join("cache");
    let services = Services {
        resolver: Arc::new(SimResolver::new(Duration::from_millis(300))),
        cache: Arc::new(MemoryCache::new(cache_root, Duration::from_secs(2))),
        store,
    };
    let factory = SimEngineFactory::new(
        SimBehavior::auto(Duration::from_millis(args.sim_open_delay_ms))
            .with_media_length(Duration::from_secs(args.sim_media_secs)),
    );

    let events = EventBus::default();
    let session = Arc::new(
        Session::start(config.clone(), services, &factory, events)
            .context("Failed to start session")?,
    );

    let state = AppState {
        session: session.clone(),
    };
    api::server::run(config.server.bind_addr, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    session.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
