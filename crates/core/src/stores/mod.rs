pub mod chroma;
pub mod memory;

pub use chroma::ChromaIndex;
pub use memory::MemoryIndex;

use crate::error::RetrievalError;
use crate::models::{EmbeddingRecord, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;

/// Vector index selected at startup.
pub enum IndexBackend {
    Memory(MemoryIndex),
    Chroma(ChromaIndex),
}

#[async_trait]
impl VectorIndex for IndexBackend {
    fn backend(&self) -> &'static str {
        match self {
            IndexBackend::Memory(inner) => inner.backend(),
            IndexBackend::Chroma(inner) => inner.backend(),
        }
    }

    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        match self {
            IndexBackend::Memory(inner) => inner.ensure_ready(dimensions).await,
            IndexBackend::Chroma(inner) => inner.ensure_ready(dimensions).await,
        }
    }

    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> Result<(), RetrievalError> {
        match self {
            IndexBackend::Memory(inner) => inner.upsert_records(records).await,
            IndexBackend::Chroma(inner) => inner.upsert_records(records).await,
        }
    }

    async fn nearest(
        &self,
        document_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        match self {
            IndexBackend::Memory(inner) => inner.nearest(document_id, query_vector, top_k).await,
            IndexBackend::Chroma(inner) => inner.nearest(document_id, query_vector, top_k).await,
        }
    }

    async fn count_chunks(&self, document_id: &str) -> Result<usize, RetrievalError> {
        match self {
            IndexBackend::Memory(inner) => inner.count_chunks(document_id).await,
            IndexBackend::Chroma(inner) => inner.count_chunks(document_id).await,
        }
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        match self {
            IndexBackend::Memory(inner) => inner.reset().await,
            IndexBackend::Chroma(inner) => inner.reset().await,
        }
    }
}
