//! Control API - HTTP routes and the status push channel

mod error;
mod handlers;
mod ws;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::assets::{ConfigFiles, DownloadCoordinator};
use crate::core::Supervisor;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub downloads: DownloadCoordinator,
    pub config: Arc<ConfigFiles>,
    /// Flips to true when the server is shutting down
    pub shutdown: watch::Receiver<bool>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/servers", get(handlers::list_servers))
        .route("/api/status", get(handlers::raw_status))
        .route("/api/servers/:id/start", post(handlers::start_server))
        .route("/api/servers/:id/stop", post(handlers::stop_server))
        .route("/api/servers/:id/remove", post(handlers::remove_instance))
        .route("/api/servers/:id/logs", get(handlers::get_logs))
        .route("/api/servers/:id/logs/stream", get(handlers::stream_logs))
        .route("/api/download/status", get(handlers::download_status))
        .route("/api/download", post(handlers::download))
        .route("/api/download/all", post(handlers::download_all))
        .route(
            "/api/config/:name",
            get(handlers::get_config).post(handlers::save_config),
        )
        .route("/ws", get(ws::status_feed))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
