use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error("file is not a pdf: {0}")]
    NotPdf(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf has no extractable text: {0}")]
    NoText(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("extraction worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("{provider} embedding request failed: {message}")]
    Provider { provider: String, message: String },

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("expected {expected} embeddings, provider returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no indexed document with id {0}")]
    UnknownDocument(String),

    #[error("index rejected request: {0}")]
    Request(String),

    #[error("index not available yet: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no api key configured for {0}")]
    MissingApiKey(String),

    #[error("llm request timed out after {0}s")]
    Timeout(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("llm provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("llm provider returned no answer")]
    EmptyResponse,
}

/// Any failure along the upload or ask pipelines, tagged by stage.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    /// Stable name of the failing stage, as reported to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Ingest(_) => "ingest_error",
            RagError::Embedding(_) => "embedding_error",
            RagError::Retrieval(_) => "retrieval_error",
            RagError::Generation(_) => "generation_error",
            RagError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
