use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::assets::config_files::ConfigDocument;
use crate::assets::logs::{self, LogExcerpt, STREAM_LINES};
use crate::assets::DownloadState;
use crate::core::status::RawEntry;
use crate::core::StatusSnapshot;

use super::error::ApiError;
use super::AppState;

/// Run synchronous supervisor work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(super) struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

pub(super) async fn list_servers(
    State(state): State<AppState>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let supervisor = state.supervisor.clone();
    let snapshot = blocking(move || Ok(supervisor.status()?)).await?;
    Ok(Json(snapshot))
}

pub(super) async fn raw_status(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, RawEntry>>, ApiError> {
    let supervisor = state.supervisor.clone();
    let raw = blocking(move || Ok(supervisor.raw_status()?)).await?;
    Ok(Json(raw))
}

pub(super) async fn start_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let supervisor = state.supervisor.clone();
    let message = blocking(move || Ok(supervisor.start(&id)?)).await?;
    info!("{}", message);
    Ok(MessageResponse::new(message))
}

pub(super) async fn stop_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let supervisor = state.supervisor.clone();
    let message = blocking(move || Ok(supervisor.stop(&id)?)).await?;
    info!("{}", message);
    Ok(MessageResponse::new(message))
}

pub(super) async fn remove_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let supervisor = state.supervisor.clone();
    let message = blocking(move || Ok(supervisor.remove(&id)?)).await?;
    Ok(MessageResponse::new(message))
}

#[derive(Debug, Deserialize)]
pub(super) struct LogQuery {
    lines: Option<usize>,
    tail: Option<bool>,
}

pub(super) async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogExcerpt>, ApiError> {
    let supervisor = state.supervisor.clone();
    let lines = query.lines.unwrap_or(supervisor.settings().log_lines);
    let tail = query.tail.unwrap_or(true);

    let excerpt = blocking(move || {
        let path = supervisor.log_path(&id)?;
        Ok(logs::read_excerpt(&path, lines, tail)?)
    })
    .await?;
    Ok(Json(excerpt))
}

pub(super) async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogExcerpt>, ApiError> {
    let supervisor = state.supervisor.clone();
    let lines = query.lines.unwrap_or(STREAM_LINES);

    let excerpt = blocking(move || {
        let path = supervisor.log_path(&id)?;
        Ok(logs::read_stream(&path, lines)?)
    })
    .await?;
    Ok(Json(excerpt))
}

pub(super) async fn download_status(
    State(state): State<AppState>,
) -> Result<Json<DownloadState>, ApiError> {
    Ok(Json(state.downloads.state()?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct DownloadRequest {
    force: bool,
    selected: Option<Vec<String>>,
}

pub(super) async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.downloads.start(request.selected, request.force)?;
    Ok(MessageResponse::new("Download started"))
}

pub(super) async fn download_all(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.downloads.start(None, request.force)?;
    Ok(MessageResponse::new("Download started"))
}

pub(super) async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ConfigDocument>, ApiError> {
    let config = state.config.clone();
    let document = blocking(move || Ok(config.read(&name)?)).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub(super) struct SaveConfigRequest {
    content: Option<Value>,
    field_path: Option<String>,
}

pub(super) async fn save_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SaveConfigRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let config = state.config.clone();
    blocking(move || {
        Ok(config.write(&name, request.content, request.field_path.as_deref())?)
    })
    .await?;
    Ok(MessageResponse::new("Config saved successfully"))
}
