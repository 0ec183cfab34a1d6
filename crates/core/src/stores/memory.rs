use crate::error::RetrievalError;
use crate::models::{EmbeddingRecord, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    dimensions: Option<usize>,
    documents: BTreeMap<String, Vec<EmbeddingRecord>>,
}

/// In-process index with cosine similarity. When opened with a path, every
/// mutation is written to a JSON snapshot before it becomes visible.
///
/// Writers queue on `writer` and build the next snapshot off to the side;
/// `state` is only write-locked for the final swap, so searches keep running
/// while a snapshot is being written to disk.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: RwLock<Snapshot>,
    writer: Mutex<()>,
    persist_path: Option<PathBuf>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RetrievalError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(error) => return Err(error.into()),
        };

        info!(
            path = %path.display(),
            documents = snapshot.documents.len(),
            "opened memory index"
        );

        Ok(Self {
            state: RwLock::new(snapshot),
            writer: Mutex::new(()),
            persist_path: Some(path),
        })
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    async fn current(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    /// Caller must hold `writer`.
    async fn commit(&self, next: Snapshot) -> Result<(), RetrievalError> {
        self.persist(&next).await?;
        *self.state.write().await = next;
        Ok(())
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), RetrievalError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let encoded = serde_json::to_vec(snapshot)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, path).await?;
        debug!(path = %path.display(), "memory index snapshot written");
        Ok(())
    }
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let dot: f32 = left.iter().zip(right.iter()).map(|(a, b)| a * b).sum();
    let norm_left: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let norm_right: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm_left == 0.0 || norm_right == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_left * norm_right))
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        let _writer = self.writer.lock().await;
        let existing = self.state.read().await.dimensions;
        match existing {
            Some(existing) if existing != dimensions => Err(RetrievalError::Request(format!(
                "index holds {existing}-dimensional vectors, embedder produces {dimensions}"
            ))),
            Some(_) => Ok(()),
            None => {
                let mut next = self.current().await;
                next.dimensions = Some(dimensions);
                self.commit(next).await
            }
        }
    }

    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> Result<(), RetrievalError> {
        if records.is_empty() {
            return Ok(());
        }

        let _writer = self.writer.lock().await;
        let mut next = self.current().await;
        let expected = next
            .dimensions
            .unwrap_or_else(|| records[0].vector.len());

        if let Some(bad) = records.iter().find(|record| record.vector.len() != expected) {
            return Err(RetrievalError::Request(format!(
                "chunk {} has dimension {} but index expects {}",
                bad.chunk.chunk_id,
                bad.vector.len(),
                expected
            )));
        }

        next.dimensions = Some(expected);
        for record in records {
            let stored = next
                .documents
                .entry(record.chunk.document_id.clone())
                .or_default();
            stored.retain(|existing| existing.chunk.chunk_id != record.chunk.chunk_id);
            stored.push(record.clone());
            stored.sort_by_key(|existing| existing.chunk.chunk_index);
        }

        self.commit(next).await
    }

    async fn nearest(
        &self,
        document_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let state = self.state.read().await;
        let Some(records) = state.documents.get(document_id) else {
            return Ok(Vec::new());
        };

        let mut scored = records
            .iter()
            .map(|record| ScoredChunk {
                chunk: record.chunk.clone(),
                score: cosine_similarity(&record.vector, query_vector),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then(left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count_chunks(&self, document_id: &str) -> Result<usize, RetrievalError> {
        let state = self.state.read().await;
        Ok(state.documents.get(document_id).map_or(0, Vec::len))
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        let _writer = self.writer.lock().await;
        self.commit(Snapshot::default()).await?;
        info!("memory index reset");
        Ok(())
    }
}
