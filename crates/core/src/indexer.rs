use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, RagError};
use crate::models::{DocumentChunk, EmbeddingRecord};
use crate::traits::VectorIndex;
use tracing::{debug, warn};

/// Embeds a document's chunks and commits them to the index.
pub struct Indexer<'a, E, V> {
    embedder: &'a E,
    index: &'a V,
    batch_size: usize,
}

impl<'a, E, V> Indexer<'a, E, V>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(embedder: &'a E, index: &'a V, batch_size: usize) -> Self {
        Self {
            embedder,
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Every chunk is embedded before the first write, so a provider failure
    /// leaves the index untouched.
    pub async fn embed_chunks(
        &self,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<EmbeddingRecord>, EmbeddingError> {
        let dimensions = self.embedder.dimensions();
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts = batch.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dimensions {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                records.push(EmbeddingRecord {
                    chunk: chunk.clone(),
                    vector,
                });
            }
            debug!(embedded = records.len(), total = chunks.len(), "embedded batch");
        }

        Ok(records)
    }

    pub async fn index_document(&self, chunks: &[DocumentChunk]) -> Result<usize, RagError> {
        let records = self.embed_chunks(chunks).await.map_err(|error| {
            warn!(%error, chunks = chunks.len(), "embedding failed, nothing written");
            error
        })?;

        self.index.ensure_ready(self.embedder.dimensions()).await?;
        self.index.upsert_records(&records).await?;
        Ok(records.len())
    }
}
