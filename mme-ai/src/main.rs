//! mme-ai - Music Metadata Engine service
//!
//! Decodes uploaded audio, measures tempo/key/loudness/pitch locally, and
//! (when an LLM key is configured) synthesizes descriptive metadata that is
//! reconciled against the measurements.

use anyhow::{Context, Result};
use clap::Parser;
use mme_common::config::{load_toml_config, resolve_config_path};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mme_ai::{build_router, config::resolve_ai_api_key, workflow::PipelineOrchestrator, AppState};

/// Command-line arguments for mme-ai
#[derive(Parser, Debug)]
#[command(name = "mme-ai")]
#[command(about = "Music metadata engine: local audio analysis with LLM synthesis")]
#[command(version)]
struct Args {
    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "MME_BIND")]
    bind: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long, env = "MME_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the config file; RUST_LOG takes precedence)
    #[arg(long, env = "MME_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), "MME_CONFIG");
    let config = load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mme_ai={level},mme_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mme-ai (Music Metadata Engine)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    let api_key = resolve_ai_api_key(&config);
    let orchestrator = PipelineOrchestrator::from_config(&config, api_key).await;
    info!(
        ai_available = orchestrator.ai_available(),
        transcription_available = orchestrator.transcription_available(),
        "Pipeline initialized"
    );

    let state = AppState::new(orchestrator, config.max_upload_bytes);
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
