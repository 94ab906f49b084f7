// src/server.rs

use crate::detector::YoloCliDetector;
use crate::ingest;
use crate::pipeline::{AnalysisReport, Pipeline};
use crate::types::Config;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use tower_http::{services::ServeFile, trace::TraceLayer};
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// Held for the whole run: output paths are fixed.
    run_lock: Arc<Mutex<()>>,
    last_report: Arc<Mutex<Option<AnalysisReport>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            run_lock: Arc::new(Mutex::new(())),
            last_report: Arc::new(Mutex::new(None)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = upload_limit_bytes(state.config.server.max_upload_mb);

    Router::new()
        .route("/", get(index))
        .route("/api/analyze", post(analyze))
        .route("/api/report", get(report))
        .route("/api/chart", get(chart))
        .route("/api/video", get(video))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;

    info!("🚦 Traffic congestion UI listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

fn upload_limit_bytes(max_upload_mb: usize) -> usize {
    max_upload_mb.saturating_mul(1024 * 1024)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "Empty upload").into_response();
    }

    let _running = state.run_lock.lock().await;

    let config = state.config.clone();
    let result = tokio::task::spawn_blocking(move || {
        let video = ingest::save_upload(&body, &config.video.upload_dir)?;
        Pipeline::new((*config).clone(), YoloCliDetector).run(&video)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            *state.last_report.lock().await = Some(report.clone());
            Json(report).into_response()
        }
        Ok(Err(e)) => {
            error!("Analysis failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Analysis failed: {:#}", e),
            )
                .into_response()
        }
        Err(e) => {
            error!("Analysis task panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Analysis task failed").into_response()
        }
    }
}

async fn report(State(state): State<AppState>) -> Response {
    match state.last_report.lock().await.as_ref() {
        Some(report) => Json(report.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "No analysis has run yet").into_response(),
    }
}

async fn chart(State(state): State<AppState>, req: Request) -> Response {
    serve_output(state.config.video.chart_path(), req).await
}

async fn video(State(state): State<AppState>, req: Request) -> Response {
    serve_output(state.config.video.output_path(), req).await
}

async fn serve_output(path: PathBuf, req: Request) -> Response {
    if !path.is_file() {
        warn!("Requested output not found: {}", path.display());
        return (StatusCode::NOT_FOUND, "Not generated yet").into_response();
    }

    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serve file: {}", err),
        )
            .into_response(),
    }
}
