//! promduck Binary Entry Point
//!
//! Runs the remote write / remote read server.
//! Core functionality is provided by the `promduck` library crate.

use clap::Parser;
use promduck::{
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
    storage::StorageBuilder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// promduck - Prometheus remote storage on DuckDB
#[derive(Parser, Debug)]
#[command(name = "promduck", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "PROMDUCK_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "PROMDUCK_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "PROMDUCK_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database path or ":memory:" (overrides config file)
    #[arg(long, env = "PROMDUCK_DB_PATH")]
    db_path: Option<String>,

    /// Sample table identifier (overrides config file)
    #[arg(long, env = "PROMDUCK_TABLE")]
    table: Option<String>,

    /// Per-call statement timeout, e.g. "30s" (overrides config file)
    #[arg(long, env = "PROMDUCK_STATEMENT_TIMEOUT", value_parser = parse_duration)]
    statement_timeout: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,promduck=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("promduck - Prometheus remote storage on DuckDB");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(table) = cli.table {
        config.database.table = table;
    }
    if let Some(timeout) = cli.statement_timeout {
        config.database.statement_timeout = Some(timeout);
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {} ({}, table {})",
        config.server.bind,
        config.server.port,
        config.database.path,
        config.database.layout,
        config.database.table,
    );

    // Build storage layer
    let mut builder = StorageBuilder::new(&config.database.path)
        .layout(config.database.layout)
        .table(&config.database.table)
        .pool_size(config.database.pool_size)
        .channel_capacity(config.database.channel_capacity)
        .statement_timeout(config.database.statement_timeout)
        .init_schema(config.database.init_schema);
    if let Some(label) = config.read.ignore_label() {
        tracing::info!(name = %label.name, value = %label.value, "Ignoring label on reads");
        builder = builder.ignore_label(label);
    }
    let handles = builder.build()?;

    // Create web server state
    let app_state = AppState {
        writer: handles.writer.clone(),
        reader: handles.reader.clone(),
        stats: Arc::clone(&handles.stats),
    };

    // Build Axum router
    let app = create_router(app_state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Remote write endpoint: http://{}/write", addr);
    tracing::info!("Remote read endpoint: http://{}/read", addr);
    tracing::info!("Metrics endpoint: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown() {
        tracing::error!("Failed to shutdown storage: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
