use crate::composer::AnswerComposer;
use crate::embeddings::Embedder;
use crate::error::{IngestError, RagError};
use crate::indexer::Indexer;
use crate::ingest::ingest_pdf;
use crate::models::{
    Answer, ChunkingOptions, HealthReport, RetrievalOptions, UploadReceipt, UploadedDocument,
};
use crate::retriever::Retriever;
use crate::traits::{LanguageModel, VectorIndex};
use std::time::Instant;
use tracing::{info, warn};

/// Wires ingestion, indexing, retrieval and answering together. Built once at
/// startup and shared by every request handler.
pub struct ChatDocService<E, V, L> {
    embedder: E,
    index: V,
    model: L,
    chunking: ChunkingOptions,
    retrieval: RetrievalOptions,
}

impl<E, V, L> ChatDocService<E, V, L>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(
        embedder: E,
        index: V,
        model: L,
        chunking: ChunkingOptions,
        retrieval: RetrievalOptions,
    ) -> Result<Self, RagError> {
        chunking.validate()?;
        if retrieval.top_k == 0 {
            return Err(RagError::InvalidRequest("top_k must be at least 1".to_string()));
        }

        Ok(Self {
            embedder,
            index,
            model,
            chunking,
            retrieval,
        })
    }

    /// Builds the service and prepares the index for the embedder's vectors.
    pub async fn open(
        embedder: E,
        index: V,
        model: L,
        chunking: ChunkingOptions,
        retrieval: RetrievalOptions,
    ) -> Result<Self, RagError> {
        let service = Self::new(embedder, index, model, chunking, retrieval)?;
        service
            .index
            .ensure_ready(service.embedder.dimensions())
            .await?;
        Ok(service)
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn retrieval_options(&self) -> RetrievalOptions {
        self.retrieval
    }

    pub async fn upload_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, RagError> {
        let started = Instant::now();
        let document = UploadedDocument::new(filename, bytes);
        let chunking = self.chunking;

        info!(
            document_id = %document.document_id,
            filename,
            bytes = document.bytes.len(),
            "ingesting upload"
        );

        let ingested = tokio::task::spawn_blocking(move || ingest_pdf(&document, chunking))
            .await
            .map_err(|error| IngestError::Worker(error.to_string()))?
            .map_err(|error| {
                warn!(filename, %error, "upload rejected");
                error
            })?;

        let indexer = Indexer::new(&self.embedder, &self.index, self.retrieval.embed_batch_size);
        let chunk_count = indexer.index_document(&ingested.chunks).await?;

        let fingerprint = ingested.fingerprint;
        info!(
            document_id = %fingerprint.document_id,
            chunk_count,
            pages = fingerprint.page_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document indexed"
        );

        Ok(UploadReceipt {
            document_id: fingerprint.document_id,
            filename: fingerprint.filename,
            chunk_count,
            page_count: fingerprint.page_count,
            checksum: fingerprint.checksum,
        })
    }

    pub async fn ask(&self, document_id: &str, question: &str) -> Result<Answer, RagError> {
        let started = Instant::now();
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(RagError::InvalidRequest("document_id is empty".to_string()));
        }

        let hits = Retriever::new(&self.embedder, &self.index)
            .retrieve(document_id, question, self.retrieval.top_k)
            .await?;

        let answer = AnswerComposer::new(&self.model, self.retrieval.max_context_chars)
            .compose(question, &hits)
            .await?;

        info!(
            document_id,
            cited = answer.source_chunk_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(answer)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "Success".to_string(),
            index_backend: self.index.backend().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub async fn reset_index(&self) -> Result<(), RagError> {
        self.index.reset().await?;
        self.index.ensure_ready(self.embedder.dimensions()).await?;
        warn!(backend = self.index.backend(), "vector index reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::{GenerationError, RetrievalError};
    use crate::fixtures::pdf_with_pages;
    use crate::stores::MemoryIndex;
    use async_trait::async_trait;

    /// Replies with the first context line that names a capital, like a grounded model would.
    struct ContextEchoModel;

    #[async_trait]
    impl LanguageModel for ContextEchoModel {
        fn name(&self) -> &str {
            "context-echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            let context = prompt
                .split("Context:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nUser's Question:").next())
                .unwrap_or_default();
            Ok(context
                .lines()
                .find(|line| line.contains("capital"))
                .map(str::to_string)
                .unwrap_or_else(|| crate::prompt::INSUFFICIENT_CONTEXT_REPLY.to_string()))
        }
    }

    async fn service() -> ChatDocService<HashingEmbedder, MemoryIndex, ContextEchoModel> {
        ChatDocService::open(
            HashingEmbedder::default(),
            MemoryIndex::new(),
            ContextEchoModel,
            ChunkingOptions::default(),
            RetrievalOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn upload_then_ask_cites_the_answering_chunk() {
        let service = service().await;
        let receipt = service
            .upload_document("france.pdf", pdf_with_pages(&["The capital of France is Paris."]))
            .await
            .unwrap();
        assert_eq!(receipt.chunk_count, 1);
        assert_eq!(receipt.filename, "france.pdf");

        let answer = service
            .ask(&receipt.document_id, "What is the capital of France?")
            .await
            .unwrap();

        assert!(answer.answer.contains("Paris"));
        assert_eq!(
            answer.source_chunk_ids,
            vec![format!("{}-00000", receipt.document_id)]
        );
    }

    #[tokio::test]
    async fn uploads_get_distinct_document_ids() {
        let service = service().await;
        let bytes = pdf_with_pages(&["Same content twice."]);
        let first = service.upload_document("a.pdf", bytes.clone()).await.unwrap();
        let second = service.upload_document("a.pdf", bytes).await.unwrap();

        assert_ne!(first.document_id, second.document_id);
        assert_eq!(first.checksum, second.checksum);
    }

    #[tokio::test]
    async fn repeated_questions_cite_the_same_chunks() {
        let service = service().await;
        let text = (0..30)
            .map(|n| format!("Paragraph {n} describes valve {n} and its pressure rating."))
            .collect::<Vec<_>>()
            .join("\n");
        let receipt = service
            .upload_document("manual.pdf", pdf_with_pages(&[&text, &text]))
            .await
            .unwrap();
        assert!(receipt.chunk_count > 4);

        let first = service.ask(&receipt.document_id, "valve 7 pressure").await.unwrap();
        let second = service.ask(&receipt.document_id, "valve 7 pressure").await.unwrap();
        assert_eq!(first.source_chunk_ids, second.source_chunk_ids);
        assert_eq!(first.source_chunk_ids.len(), 4);
    }

    #[tokio::test]
    async fn non_pdf_upload_is_an_ingest_error() {
        let service = service().await;
        let error = service
            .upload_document("notes.txt", b"plain text".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(error, RagError::Ingest(IngestError::NotPdf(_))));

        let error = service.upload_document("empty.pdf", Vec::new()).await.unwrap_err();
        assert!(matches!(error, RagError::Ingest(IngestError::EmptyUpload)));
    }

    #[tokio::test]
    async fn asking_about_an_unknown_document_fails_in_retrieval() {
        let service = service().await;
        let error = service.ask("missing", "Anything?").await.unwrap_err();
        assert!(matches!(
            error,
            RagError::Retrieval(RetrievalError::UnknownDocument(_))
        ));
    }

    #[tokio::test]
    async fn reset_drops_indexed_documents() {
        let service = service().await;
        let receipt = service
            .upload_document("france.pdf", pdf_with_pages(&["The capital of France is Paris."]))
            .await
            .unwrap();

        service.reset_index().await.unwrap();
        assert_eq!(service.index().count_chunks(&receipt.document_id).await.unwrap(), 0);
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let result = ChatDocService::new(
            HashingEmbedder::default(),
            MemoryIndex::new(),
            ContextEchoModel,
            ChunkingOptions::default(),
            RetrievalOptions {
                top_k: 0,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn health_reports_the_index_backend() {
        let service = ChatDocService::new(
            HashingEmbedder::default(),
            MemoryIndex::new(),
            ContextEchoModel,
            ChunkingOptions::default(),
            RetrievalOptions::default(),
        )
        .unwrap();
        let report = service.health();
        assert_eq!(report.status, "Success");
        assert_eq!(report.index_backend, "memory");
    }
}
