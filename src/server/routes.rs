use crate::component::artifact_store::ArtifactStore;
use crate::component::job_orchestrator::Orchestrator;
use crate::config::ServerSettings;
use crate::error::PipelineError;
use anyhow::{Context, Result};
use axum::extract::{Form, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

const URL_REQUIRED: &str = "Video URL is required.";
const GENERATED: &str = "Sprite and VTT generated successfully!";
const FILE_NOT_FOUND: &str = "File not found";

/// 關閉旗標輪詢間隔
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn ArtifactStore>,
}

#[derive(Debug, Deserialize)]
struct GenerateForm {
    video_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub message: String,
    pub sprite_url: String,
    pub vtt_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// 錯誤種類對應 HTTP 狀態碼
#[must_use]
pub const fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::InvalidSource(_) => StatusCode::BAD_REQUEST,
        PipelineError::Unreachable(_) => StatusCode::BAD_GATEWAY,
        PipelineError::ProbeFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::ExtractionFailed(_)
        | PipelineError::EncodingFailed(_)
        | PipelineError::StorageFailed(_)
        | PipelineError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: AppState, public_base_path: &str) -> Router {
    let artifacts = format!("{}/:job_id/:file", public_base_path.trim_end_matches('/'));
    Router::new()
        .route("/generate", post(generate))
        .route(&artifacts, get(artifact))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

async fn generate(State(state): State<AppState>, Form(form): Form<GenerateForm>) -> Response {
    let Some(video_url) = form
        .video_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
    else {
        return message(StatusCode::BAD_REQUEST, URL_REQUIRED);
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    let result = tokio::task::spawn_blocking(move || orchestrator.submit(&video_url))
        .await
        .unwrap_or_else(|e| Err(PipelineError::InternalError(format!("worker task failed: {e}"))));

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(GenerateResponse {
                message: GENERATED.to_string(),
                sprite_url: outcome.sprite_url,
                vtt_url: outcome.vtt_url,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("請求失敗 [{}]: {e}", e.kind());
            message(status_for(&e), e.to_string())
        }
    }
}

async fn artifact(
    State(state): State<AppState>,
    Path((job_id, file)): Path<(String, String)>,
) -> Response {
    let store = Arc::clone(&state.store);
    let found = tokio::task::spawn_blocking(move || store.fetch(&job_id, &file))
        .await
        .ok()
        .flatten();

    match found {
        Some(artifact) => (
            [(header::CONTENT_TYPE, artifact.content_type)],
            [(header::CONTENT_LOCATION, artifact.locator)],
            artifact.bytes,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, FILE_NOT_FOUND).into_response(),
    }
}

/// 綁定 `bind_address:port` 並服務到關閉旗標被設定
pub async fn serve(
    settings: &ServerSettings,
    state: AppState,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let addr = format!("{}:{}", settings.bind_address, settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("無法綁定 {addr}"))?;
    serve_on(listener, state, &settings.public_base_path, shutdown).await
}

pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    public_base_path: &str,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    info!("HTTP 服務監聽於 {}", listener.local_addr()?);

    let orchestrator = Arc::clone(&state.orchestrator);
    let app = router(state, public_base_path);
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown, orchestrator))
        .await
        .context("HTTP 服務異常結束")?;

    info!("HTTP 服務已停止");
    Ok(())
}

/// 旗標設定後取消所有工作，讓進行中的請求盡快回應
async fn wait_for_shutdown(shutdown: Arc<AtomicBool>, orchestrator: Arc<Orchestrator>) {
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
    info!("收到關閉信號，停止接受新請求");
    orchestrator.shutdown();
}
