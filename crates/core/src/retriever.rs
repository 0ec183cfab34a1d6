use crate::embeddings::Embedder;
use crate::error::{RagError, RetrievalError};
use crate::models::{Query, ScoredChunk};
use crate::traits::VectorIndex;
use std::cmp::Ordering;
use tracing::debug;

pub struct Retriever<'a, E, V> {
    embedder: &'a E,
    index: &'a V,
}

impl<'a, E, V> Retriever<'a, E, V>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(embedder: &'a E, index: &'a V) -> Self {
        Self { embedder, index }
    }

    pub async fn embed_query(&self, document_id: &str, question: &str) -> Result<Query, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidRequest("question is empty".to_string()));
        }

        Ok(Query {
            document_id: document_id.to_string(),
            question: question.to_string(),
            vector: self.embedder.embed(question).await?,
        })
    }

    /// The `top_k` chunks of one document closest to the question, best first,
    /// equal scores in document order.
    pub async fn retrieve(
        &self,
        document_id: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question is empty".to_string()));
        }

        let available = self.index.count_chunks(document_id).await?;
        if available == 0 {
            return Err(RetrievalError::UnknownDocument(document_id.to_string()).into());
        }

        let top_k = top_k.max(1);
        let query = self.embed_query(document_id, question).await?;

        // Approximate indexes cut at `n` in arbitrary order among equal scores,
        // so widen the fetch until the cut falls strictly below the k-th score.
        let mut fetch = top_k.saturating_mul(2).min(available).max(top_k);
        let mut hits = loop {
            let mut hits = self
                .index
                .nearest(&query.document_id, &query.vector, fetch)
                .await?;
            rank(&mut hits);

            let tie_at_cut = hits.len() >= fetch
                && hits.len() > top_k
                && hits[fetch - 1].score >= hits[top_k - 1].score;
            if !tie_at_cut || fetch >= available {
                break hits;
            }
            fetch = fetch.saturating_mul(2).min(available);
        };
        hits.truncate(top_k);
        debug!(
            document_id,
            hits = hits.len(),
            best = hits.first().map(|hit| hit.score),
            "retrieved chunks"
        );
        Ok(hits)
    }
}

pub fn rank(hits: &mut [ScoredChunk]) {
    hits.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then(left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::indexer::Indexer;
    use crate::models::DocumentChunk;
    use crate::models::EmbeddingRecord;
    use crate::stores::MemoryIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Every chunk scores the same; results come back highest index first and
    /// are cut at `top_k`, the way an approximate index may order ties.
    struct TiedIndex {
        chunks: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for TiedIndex {
        fn backend(&self) -> &'static str {
            "tied"
        }

        async fn ensure_ready(&self, _dimensions: usize) -> Result<(), RetrievalError> {
            Ok(())
        }

        async fn upsert_records(&self, _records: &[EmbeddingRecord]) -> Result<(), RetrievalError> {
            Ok(())
        }

        async fn nearest(
            &self,
            _document_id: &str,
            _query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>, RetrievalError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok((0..self.chunks as u64)
                .rev()
                .take(top_k)
                .map(|index| ScoredChunk {
                    chunk: chunk(index, "same"),
                    score: 0.5,
                })
                .collect())
        }

        async fn count_chunks(&self, _document_id: &str) -> Result<usize, RetrievalError> {
            Ok(self.chunks)
        }

        async fn reset(&self) -> Result<(), RetrievalError> {
            Ok(())
        }
    }

    fn chunk(index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("doc-{index:05}"),
            document_id: "doc".to_string(),
            chunk_index: index,
            text: text.to_string(),
            char_start: 0,
            char_end: text.chars().count(),
            page_start: 1,
            page_end: 1,
        }
    }

    async fn indexed(embedder: &HashingEmbedder, texts: &[&str]) -> MemoryIndex {
        let index = MemoryIndex::new();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| chunk(index as u64, text))
            .collect::<Vec<_>>();
        Indexer::new(embedder, &index, 8)
            .index_document(&chunks)
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn most_similar_chunk_comes_first() {
        let embedder = HashingEmbedder::default();
        let index = indexed(
            &embedder,
            &[
                "Hydraulic pumps need regular maintenance.",
                "The capital of France is Paris.",
                "Bananas are rich in potassium.",
            ],
        )
        .await;

        let hits = Retriever::new(&embedder, &index)
            .retrieve("doc", "What is the capital of France?", 2)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "doc-00001");
    }

    #[tokio::test]
    async fn retrieval_is_repeatable() {
        let embedder = HashingEmbedder::default();
        let index = indexed(&embedder, &["same text", "same text", "other words", "same text"]).await;
        let retriever = Retriever::new(&embedder, &index);

        let first = retriever.retrieve("doc", "same text", 3).await.unwrap();
        let second = retriever.retrieve("doc", "same text", 3).await.unwrap();
        let ids = |hits: &[ScoredChunk]| {
            hits.iter()
                .map(|hit| hit.chunk.chunk_id.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), vec!["doc-00000", "doc-00001", "doc-00003"]);
    }

    #[tokio::test]
    async fn unknown_document_is_a_retrieval_error() {
        let embedder = HashingEmbedder::default();
        let index = MemoryIndex::new();
        let error = Retriever::new(&embedder, &index)
            .retrieve("nope", "anything?", 3)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RagError::Retrieval(RetrievalError::UnknownDocument(_))
        ));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let embedder = HashingEmbedder::default();
        let index = indexed(&embedder, &["text"]).await;
        let error = Retriever::new(&embedder, &index)
            .retrieve("doc", "   ", 3)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn ties_at_the_cut_keep_the_earliest_chunks() {
        let embedder = HashingEmbedder::default();
        let index = TiedIndex {
            chunks: 5,
            calls: AtomicUsize::new(0),
        };

        let hits = Retriever::new(&embedder, &index)
            .retrieve("doc", "anything", 4)
            .await
            .unwrap();

        let order = hits
            .iter()
            .map(|hit| hit.chunk.chunk_index)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn fetch_widens_until_the_whole_tie_is_seen() {
        let embedder = HashingEmbedder::default();
        let index = TiedIndex {
            chunks: 20,
            calls: AtomicUsize::new(0),
        };

        let hits = Retriever::new(&embedder, &index)
            .retrieve("doc", "anything", 3)
            .await
            .unwrap();

        let order = hits
            .iter()
            .map(|hit| hit.chunk.chunk_index)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1, 2]);
        // 6, 12, then all 20.
        assert_eq!(index.calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blank_question_is_checked_before_the_document() {
        let embedder = HashingEmbedder::default();
        let index = MemoryIndex::new();
        let error = Retriever::new(&embedder, &index)
            .retrieve("missing", "  ", 3)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "invalid_request");
    }

    #[test]
    fn ties_break_on_chunk_index() {
        let mut hits = vec![
            ScoredChunk {
                chunk: chunk(3, "c"),
                score: 0.5,
            },
            ScoredChunk {
                chunk: chunk(1, "a"),
                score: 0.5,
            },
            ScoredChunk {
                chunk: chunk(2, "b"),
                score: 0.9,
            },
        ];
        rank(&mut hits);
        let order = hits
            .iter()
            .map(|hit| hit.chunk.chunk_index)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
