use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;

use crate::{
    error::ApiError,
    history::{HistoryFile, HistoryStore},
    normalize::normalize,
    scanner::{NmapScanner, ScanCapability},
    types::{HistoryLog, HistoryRequest, ScanRequest, ScanResult},
};

/// Everything the binary needs to stand the API up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub history_file: PathBuf,
    pub nmap_path: PathBuf,
    pub default_options: String,
    pub ui_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppState {
    scanner: Arc<dyn ScanCapability>,
    history: HistoryStore,
    default_options: Arc<str>,
}

impl AppState {
    pub fn new(
        scanner: Arc<dyn ScanCapability>,
        history: HistoryStore,
        default_options: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            history,
            default_options: Arc::from(default_options.into()),
        }
    }
}

/// Build the API router: `POST /scan`, `GET /history` and `POST /history`,
/// with an optional static directory served for every other path.
pub fn router(state: AppState, ui_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/history", get(get_history).post(post_history))
        .route_layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let app = match ui_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => api,
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

pub async fn spawn_server(config: ServerConfig) -> Result<()> {
    let history = HistoryStore::spawn(HistoryFile::new(&config.history_file));
    let scanner = Arc::new(NmapScanner::new(&config.nmap_path));
    info!(scanner = scanner.name(), binary = %config.nmap_path.display(), "scan capability ready");

    let state = AppState::new(scanner, history, config.default_options.clone());
    let app = router(state, config.ui_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "serving scan API");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn post_scan(
    State(app): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResult>, ApiError> {
    let Json(req) = payload?;
    let (target, options) = req.resolve(&app.default_options)?;

    let raw = app.scanner.scan(&target, &options).await?;
    let results = normalize(raw);
    info!(scan_target = %target, %options, hosts = results.len(), "scan complete");
    Ok(Json(results))
}

async fn get_history(State(app): State<AppState>) -> Result<Json<HistoryLog>, ApiError> {
    Ok(Json(app.history.read_all().await?))
}

async fn post_history(
    State(app): State<AppState>,
    payload: Result<Json<HistoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    app.history.append(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "History saved." })),
    ))
}
