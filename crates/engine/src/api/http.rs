//! HTTP routes.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use falbridge_domain::{NodeSchema, Payload};
use falbridge_shared::{DownloadRequest, PromptRequest};

use super::websocket::ws_handler;
use crate::app::App;
use crate::use_cases::{BridgeError, DownloadError};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/fal/execute", post(execute_prompt))
        .route("/fal/save", post(save_payload))
        .route("/fal/download", post(download_outputs))
        .route("/fal/nodes", get(list_nodes))
        .route("/ws", get(ws_handler))
}

async fn health() -> &'static str {
    "OK"
}

/// Run the workflow remotely; progress is pushed over the client's socket.
async fn execute_prompt(
    State(app): State<Arc<App>>,
    Json(request): Json<PromptRequest>,
) -> Result<StatusCode, ApiError> {
    app.use_cases
        .execute
        .execute(
            request.client_id.as_deref(),
            &request.output,
            request.workflow,
        )
        .await?;
    Ok(StatusCode::OK)
}

/// Dry-run payload for export. Nothing is uploaded.
async fn save_payload(
    State(app): State<Arc<App>>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<Payload>, ApiError> {
    let payload = app
        .use_cases
        .build_payload
        .execute(&request.output, request.workflow, true)
        .await?;
    Ok(Json(payload.without_ui_metadata()))
}

async fn download_outputs(
    State(app): State<Arc<App>>,
    Json(request): Json<DownloadRequest>,
) -> Result<StatusCode, ApiError> {
    let stored = app.use_cases.download.execute(&request.files).await?;
    tracing::info!(requested = request.files.len(), stored, "Downloaded outputs");
    Ok(StatusCode::OK)
}

async fn list_nodes(State(app): State<Arc<App>>) -> Json<Vec<NodeSchema>> {
    Json(app.nodes.schemas().into_iter().cloned().collect())
}

#[derive(Debug)]
pub enum ApiError {
    Bridge(BridgeError),
    Download(DownloadError),
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError::Bridge(e)
    }
}

impl From<DownloadError> for ApiError {
    fn from(e: DownloadError) -> Self {
        ApiError::Download(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Bridge(e) => {
                let status =
                    StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(e.to_envelope())).into_response()
            }
            ApiError::Download(e) => {
                tracing::warn!(error = %e, "Rejected download request");
                let status =
                    StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, e.to_string()).into_response()
            }
        }
    }
}
