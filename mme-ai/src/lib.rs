//! mme-ai library interface
//!
//! Exposes the analysis engine and HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod dsp;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use workflow::PipelineOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup; collaborators are fixed for the process lifetime
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last run error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: PipelineOrchestrator, max_upload_bytes: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            max_upload_bytes,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a failed run for `/health`
    pub async fn record_error(&self, err: &types::PipelineError) {
        *self.last_error.write().await = Some(format!("{}: {}", err.stage(), err));
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
