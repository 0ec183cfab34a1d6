use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A PDF as received from a caller. Only lives until its chunks are extracted.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub document_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            document_id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub filename: String,
    pub checksum: String,
    pub byte_len: usize,
    pub page_count: u32,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub page_start: u32,
    pub page_end: u32,
}

/// A chunk together with its vector. Always written to the index as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub document_id: String,
    pub question: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub source_chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub document_id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub page_count: u32,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub index_backend: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub max_context_chars: usize,
    pub embed_batch_size: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 6_000,
            embed_batch_size: 32,
        }
    }
}
