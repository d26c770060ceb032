// HTTP interface
// Chat, course listing and health endpoints over axum

#[cfg(test)]
mod tests;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::assistant::{CourseAssistant, EMPTY_MESSAGE_ERROR};
use crate::catalog::{CatalogRow, load_catalog};
use crate::config::Config;
use crate::provider::{ChatModel, Embedder};
use crate::{DandoriError, ErrorKind, Result};

pub const HEALTHY: &str = "healthy";

/// Startup state of the question-answering pipeline.
#[derive(Debug, Clone, Default)]
pub enum Readiness {
    #[default]
    Initializing,
    Ready(Arc<CourseAssistant>),
}

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    readiness: Arc<RwLock<Readiness>>,
    catalog_path: Arc<Path>,
    request_timeout: Duration,
}

impl AppState {
    /// State for a server whose pipeline is still starting.
    #[inline]
    pub fn new(catalog_path: &Path, request_timeout: Duration) -> Self {
        Self {
            readiness: Arc::new(RwLock::new(Readiness::Initializing)),
            catalog_path: Arc::from(catalog_path),
            request_timeout,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.catalog_path(),
            Duration::from_secs(config.server.request_timeout_secs),
        )
    }

    #[inline]
    pub async fn mark_ready(&self, assistant: Arc<CourseAssistant>) {
        *self.readiness.write().await = Readiness::Ready(assistant);
    }

    #[inline]
    pub async fn is_ready(&self) -> bool {
        matches!(*self.readiness.read().await, Readiness::Ready(_))
    }

    async fn assistant(&self) -> Result<Arc<CourseAssistant>> {
        match &*self.readiness.read().await {
            Readiness::Ready(assistant) => Ok(Arc::clone(assistant)),
            Readiness::Initializing => Err(DandoriError::NotReady),
        }
    }
}

/// Build the application router with permissive CORS and request tracing.
#[inline]
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/api/chat", post(handle_chat))
        .route("/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address, then build the pipeline in the background.
///
/// Requests that need the pipeline get 503 until it is ready. A startup
/// failure stops the server and is returned.
#[inline]
pub async fn serve(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
) -> Result<()> {
    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    let state = AppState::from_config(config);
    let startup_state = state.clone();
    let startup_config = config.clone();
    let startup = tokio::spawn(async move {
        let assistant = CourseAssistant::initialize(&startup_config, embedder, chat).await?;
        startup_state.mark_ready(Arc::new(assistant)).await;
        info!("RAG system ready");
        Ok::<(), DandoriError>(())
    });

    let server = axum::serve(listener, router(state)).into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(DandoriError::from),
        joined = startup => {
            if let Err(e) = joined? {
                error!("RAG system failed to initialise: {}", e);
                return Err(e);
            }
        }
    }

    server.await.map_err(DandoriError::from)
}

/// Serve `state` on an already bound listener until the process ends.
#[inline]
pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// JSON error body, `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
}

/// Error converted into an HTTP response carrying only a safe message.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<DandoriError> for AppError {
    fn from(err: DandoriError) -> Self {
        let status = match (err.kind(), &err) {
            (ErrorKind::Validation, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::Unavailable, DandoriError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            (ErrorKind::Unavailable, _) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            debug!("Request rejected: {}", err);
        }

        Self {
            status,
            message: err.public_message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected chat body: {}", rejection.body_text());
        AppError::bad_request(rejection.body_text())
    })?;

    let message = request.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(AppError::bad_request(EMPTY_MESSAGE_ERROR));
    }

    let assistant = state.assistant().await?;
    let response = tokio::time::timeout(state.request_timeout, assistant.query(&message))
        .await
        .map_err(|_| DandoriError::Timeout(state.request_timeout.as_secs()))??;

    Ok(Json(ChatResponse { response }))
}

async fn handle_courses(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<CatalogRow>>, AppError> {
    let path: PathBuf = state.catalog_path.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || load_catalog(&path))
        .await
        .map_err(DandoriError::from)??;

    debug!("Listing {} courses", rows.len());
    Ok(Json(rows))
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HEALTHY.to_string(),
        ready: state.is_ready().await,
    })
}
