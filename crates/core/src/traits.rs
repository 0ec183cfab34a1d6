use crate::error::{GenerationError, RetrievalError};
use crate::models::{EmbeddingRecord, ScoredChunk};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    /// Short backend name for logs and health reports.
    fn backend(&self) -> &'static str;

    /// Prepares the backing collection for vectors of `dimensions` length.
    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError>;

    /// Writes every record as a whole: chunk text, metadata and vector together.
    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> Result<(), RetrievalError>;

    /// Up to `top_k` records of one document, most similar first.
    async fn nearest(
        &self,
        document_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError>;

    async fn count_chunks(&self, document_id: &str) -> Result<usize, RetrievalError>;

    /// Drops every record of every document.
    async fn reset(&self) -> Result<(), RetrievalError>;
}

#[async_trait]
pub trait LanguageModel {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}
