//! fleetmaster daemon
//!
//! Game-server fleet manager: HTTP API on axum, registry on kameo actors,
//! containers through the Docker CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use eyre::WrapErr;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod factory;
mod router;
mod state;

use config::{Config, LogFormat};
use state::AppState;

/// fleetmaster daemon
#[derive(Parser, Debug)]
#[command(name = "fleetmaster")]
#[command(about = "Game-server fleet manager", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "FLEETMASTER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = Config::load_default(args.config.as_deref())?;
    init_tracing(&config);

    info!(
        fleet = %config.fleet.name,
        bind = %config.daemon.bind,
        heartbeat = %config.heartbeat.bind,
        "fleetmaster starting"
    );

    let manager = factory::create_manager(&config).await?;
    if let Some(addr) = manager.heartbeat_addr() {
        info!(%addr, "listening for heartbeats");
    }

    let shutdown_timeout = config.daemon.shutdown_timeout();
    let bind = config.daemon.bind.clone();
    let state = Arc::new(AppState::new(manager.clone(), config));
    let app = router::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("binding {bind}"))?;
    info!(addr = %bind, "listening for connections");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "http server failed");
    }

    manager.shutdown(shutdown_timeout).await?;
    info!("fleetmaster stopped");
    served.wrap_err("http server")
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.daemon.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
