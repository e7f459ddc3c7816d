//! Laudiolin Gateway (laud-gw) - Main entry point
//!
//! Loads configuration, starts the admission maintenance tasks and serves
//! the HTTP surface (gateway WebSocket plus playback control endpoints).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use humantime_serde::re::humantime::format_duration;
use laud_common::config::ConfigResolver;
use laud_gw::admission::{AdmissionController, MaintenanceTasks};
use laud_gw::api::{build_router, AppContext};
use laud_gw::gateway::SessionRegistry;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for laud-gw
#[derive(Parser, Debug)]
#[command(name = "laud-gw")]
#[command(about = "Laudiolin gateway and admission front end")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "LAUD_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "LAUD_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long, env = "LAUD_BIND_ADDRESS")]
    bind: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone());
    let config_path = resolver.resolve();
    let config = resolver.load().context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "laud_gw={level},laud_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Laudiolin Gateway (laud-gw) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("No config file found, using compiled defaults"),
    }

    let limits = &config.rate_limits;
    info!(
        max_requests = limits.max_requests,
        within_window = %format_duration(limits.within_window),
        reset_window = %format_duration(limits.reset_window),
        exempt = limits.exempt.len(),
        fail_mode = ?limits.fail_mode,
        "Rate limits configured"
    );

    let admission = Arc::new(AdmissionController::new(limits));
    let registry = Arc::new(SessionRegistry::new());
    let maintenance = MaintenanceTasks::spawn(Arc::clone(&admission));

    let app = build_router(AppContext {
        registry: Arc::clone(&registry),
        admission,
        site_url: config.site_url.clone(),
        queue_timeout: config.gateway.queue_timeout,
    });

    let bind_ip = match args.bind {
        Some(ip) => ip,
        None => config
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind_address '{}'", config.bind_address))?,
    };
    let addr = SocketAddr::new(bind_ip, args.port.unwrap_or(config.port));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    maintenance.shutdown();
    registry.close_all().await;

    info!("Server shutdown complete");
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
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
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
