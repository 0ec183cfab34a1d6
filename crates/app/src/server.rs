//! HTTP API: upload a PDF, ask questions about it, check health.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chatdoc_core::{
    Answer, ChatDocService, Embedder, GenerationError, HealthReport, IngestError, LanguageModel,
    RagError, RetrievalError, UploadReceipt, VectorIndex,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// 200 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub document_id: String,
    pub question: String,
}

/// Failure reported to API callers as `{"error": {"kind", "message"}}`.
#[derive(Debug)]
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RagError::Ingest(IngestError::NoText(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Ingest(IngestError::Worker(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RagError::Ingest(_) | RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RagError::Retrieval(RetrievalError::UnknownDocument(_)) => StatusCode::NOT_FOUND,
            RagError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Embedding(_) => StatusCode::BAD_GATEWAY,
            RagError::Generation(GenerationError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            RagError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "request failed");
        }

        let body = Json(json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError(RagError::InvalidRequest(message.into()))
}

pub fn router<E, V, L>(service: Arc<ChatDocService<E, V, L>>, max_upload_bytes: usize) -> Router
where
    E: Embedder + Send + Sync + 'static,
    V: VectorIndex + Send + Sync + 'static,
    L: LanguageModel + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(health::<E, V, L>))
        .route("/upload-pdf", post(upload_pdf::<E, V, L>))
        .route("/upload-pdf/", post(upload_pdf::<E, V, L>))
        .route("/ask-question", post(ask_question::<E, V, L>))
        .route("/ask-question/", post(ask_question::<E, V, L>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health<E, V, L>(State(service): State<Arc<ChatDocService<E, V, L>>>) -> Json<HealthReport>
where
    E: Embedder + Send + Sync + 'static,
    V: VectorIndex + Send + Sync + 'static,
    L: LanguageModel + Send + Sync + 'static,
{
    Json(service.health())
}

async fn upload_pdf<E, V, L>(
    State(service): State<Arc<ChatDocService<E, V, L>>>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError>
where
    E: Embedder + Send + Sync + 'static,
    V: VectorIndex + Send + Sync + 'static,
    L: LanguageModel + Send + Sync + 'static,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| invalid(format!("failed to read multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.pdf".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|error| invalid(format!("failed to read file {filename}: {error}")))?;

        info!(filename = %filename, bytes = bytes.len(), "received upload");
        let receipt = service.upload_document(&filename, bytes.to_vec()).await?;
        return Ok(Json(receipt));
    }

    Err(invalid("multipart field `file` is missing"))
}

async fn ask_question<E, V, L>(
    State(service): State<Arc<ChatDocService<E, V, L>>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError>
where
    E: Embedder + Send + Sync + 'static,
    V: VectorIndex + Send + Sync + 'static,
    L: LanguageModel + Send + Sync + 'static,
{
    let Json(request) = payload.map_err(|rejection| invalid(rejection.body_text()))?;
    let answer = service.ask(&request.document_id, &request.question).await?;
    Ok(Json(answer))
}

pub async fn serve<E, V, L>(
    service: ChatDocService<E, V, L>,
    addr: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()>
where
    E: Embedder + Send + Sync + 'static,
    V: VectorIndex + Send + Sync + 'static,
    L: LanguageModel + Send + Sync + 'static,
{
    let app = router(Arc::new(service), max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
