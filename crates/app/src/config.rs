use anyhow::Context;
use chatdoc_core::{
    ChatDocService, ChatModelConfig, ChromaIndex, ChunkingOptions, EmbeddingBackend,
    HashingEmbedder, IndexBackend, MemoryIndex, OpenAiChatModel, OpenAiEmbedder,
    OpenAiEmbeddingConfig, RetrievalOptions, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_EMBEDDING_DIMENSIONS, DEFAULT_OPENAI_EMBEDDING_MODEL,
};
use clap::{ArgAction, Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub type AppService = ChatDocService<EmbeddingBackend, IndexBackend, OpenAiChatModel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingKind {
    /// Local trigram hashing, no network.
    Hashing,
    /// OpenAI-compatible embeddings endpoint.
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexKind {
    /// In-process index persisted to a JSON snapshot.
    Memory,
    /// Chroma server over HTTP.
    Chroma,
}

/// Everything the server side needs: providers, index and pipeline tuning.
#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    /// API key for the LLM and embeddings provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    /// Chat model used to answer questions
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 512)]
    pub max_tokens: u32,

    /// Embedding backend
    #[arg(long, env = "EMBEDDING_BACKEND", value_enum, default_value_t = EmbeddingKind::Hashing)]
    pub embedding_backend: EmbeddingKind,

    /// Embedding model name (openai backend)
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_OPENAI_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Vector size; defaults to the backend's native size
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Exported to the process environment for tokenizer libraries
    #[arg(long, env = "TOKENIZERS_PARALLELISM", default_value_t = false, action = ArgAction::Set)]
    pub tokenizers_parallelism: bool,

    /// Vector index backend
    #[arg(long, env = "INDEX_BACKEND", value_enum, default_value_t = IndexKind::Memory)]
    pub index_backend: IndexKind,

    /// Snapshot file of the memory index
    #[arg(long, env = "INDEX_PATH", default_value = "chroma_db/index.json")]
    pub index_path: PathBuf,

    /// Chroma server URL
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000")]
    pub chroma_url: String,

    /// Chroma collection
    #[arg(long, env = "CHROMA_COLLECTION", default_value = "chatdoc")]
    pub chroma_collection: String,

    #[arg(long, env = "CHUNK_SIZE", default_value_t = 512)]
    pub chunk_size: usize,

    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 40)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "TOP_K", default_value_t = 4)]
    pub top_k: usize,

    /// Character budget for retrieved context in the prompt
    #[arg(long, env = "MAX_CONTEXT_CHARS", default_value_t = 6_000)]
    pub max_context_chars: usize,

    #[arg(long, env = "EMBED_BATCH_SIZE", default_value_t = 32)]
    pub embed_batch_size: usize,

    /// Timeout for every provider and index request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,
}

impl BackendArgs {
    pub fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn retrieval(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k,
            max_context_chars: self.max_context_chars,
            embed_batch_size: self.embed_batch_size,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions.unwrap_or(match self.embedding_backend {
            EmbeddingKind::Hashing => DEFAULT_EMBEDDING_DIMENSIONS,
            EmbeddingKind::Openai => DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
        })
    }

    pub fn embedder(&self) -> anyhow::Result<EmbeddingBackend> {
        Ok(match self.embedding_backend {
            EmbeddingKind::Hashing => EmbeddingBackend::Hashing(HashingEmbedder {
                dimensions: self.embedding_dimensions(),
            }),
            EmbeddingKind::Openai => EmbeddingBackend::OpenAi(
                OpenAiEmbedder::new(OpenAiEmbeddingConfig {
                    base_url: self.openai_base_url.clone(),
                    api_key: self.openai_api_key.clone(),
                    model: self.embedding_model.clone(),
                    dimensions: self.embedding_dimensions(),
                    timeout: self.timeout(),
                })
                .context("building embeddings client")?,
            ),
        })
    }

    pub async fn index(&self) -> anyhow::Result<IndexBackend> {
        Ok(match self.index_backend {
            IndexKind::Memory => IndexBackend::Memory(
                MemoryIndex::open(&self.index_path)
                    .await
                    .with_context(|| format!("opening index at {}", self.index_path.display()))?,
            ),
            IndexKind::Chroma => IndexBackend::Chroma(
                ChromaIndex::new(&self.chroma_url, &self.chroma_collection, self.timeout())
                    .with_context(|| format!("configuring chroma at {}", self.chroma_url))?,
            ),
        })
    }

    pub fn chat_model(&self) -> anyhow::Result<OpenAiChatModel> {
        if self.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; questions will fail until it is configured");
        }

        OpenAiChatModel::new(ChatModelConfig {
            base_url: self.openai_base_url.clone(),
            api_key: self.openai_api_key.clone(),
            model: self.chat_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout(),
        })
        .context("building chat client")
    }

    /// Must run before the async runtime starts any threads.
    pub fn export_process_env(&self) {
        std::env::set_var(
            "TOKENIZERS_PARALLELISM",
            self.tokenizers_parallelism.to_string(),
        );
    }
}

pub async fn build_service(args: &BackendArgs) -> anyhow::Result<AppService> {
    let embedder = args.embedder()?;
    let index = args.index().await?;
    let model = args.chat_model()?;

    info!(
        embedding_backend = embedder.name(),
        dimensions = args.embedding_dimensions(),
        index_backend = ?args.index_backend,
        chat_model = %args.chat_model,
        chunk_size = args.chunk_size,
        chunk_overlap = args.chunk_overlap,
        top_k = args.top_k,
        "configuration loaded"
    );

    ChatDocService::open(embedder, index, model, args.chunking(), args.retrieval())
        .await
        .context("preparing vector index")
}
