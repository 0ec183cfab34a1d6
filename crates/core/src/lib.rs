pub mod chunking;
pub mod composer;
pub mod embeddings;
pub mod error;
pub mod extractor;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chunking::{make_chunk_id, normalize_whitespace, split_text, TextSpan};
pub use composer::AnswerComposer;
pub use embeddings::{
    Embedder, EmbeddingBackend, HashingEmbedder, OpenAiEmbedder, OpenAiEmbeddingConfig,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
    DEFAULT_OPENAI_EMBEDDING_MODEL,
};
pub use error::{EmbeddingError, GenerationError, IngestError, RagError, RetrievalError};
pub use extractor::{extract_page_texts, ExtractedPdf, LopdfExtractor, PageText, PdfExtractor};
pub use indexer::Indexer;
pub use ingest::{digest_bytes, ingest_pdf, IngestedDocument};
pub use llm::{ChatModelConfig, OpenAiChatModel, DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
pub use models::{
    Answer, ChunkingOptions, DocumentChunk, DocumentFingerprint, EmbeddingRecord, HealthReport,
    Query, RetrievalOptions, ScoredChunk, UploadReceipt, UploadedDocument,
};
pub use orchestrator::ChatDocService;
pub use prompt::{BuiltPrompt, PromptBuilder, INSUFFICIENT_CONTEXT_REPLY};
pub use retriever::Retriever;
pub use stores::{ChromaIndex, IndexBackend, MemoryIndex};
pub use traits::{LanguageModel, VectorIndex};
