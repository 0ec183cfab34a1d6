use crate::error::RetrievalError;
use crate::models::{DocumentChunk, EmbeddingRecord, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "chroma";

/// Client for a Chroma server's v1 REST API. One collection holds every
/// document; records are filtered by their `document_id` metadata.
pub struct ChromaIndex {
    endpoint: Url,
    collection: String,
    client: Client,
    collection_id: RwLock<Option<String>>,
}

impl ChromaIndex {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            collection_id: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url, RetrievalError> {
        Ok(self.endpoint.join(path)?)
    }

    async fn collection_id(&self) -> Result<String, RetrievalError> {
        if let Some(id) = self.collection_id.read().await.clone() {
            return Ok(id);
        }
        Err(RetrievalError::NotReady(format!(
            "collection {} has not been opened",
            self.collection
        )))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, RetrievalError> {
        let response = self.client.post(self.url(path)?).json(&body).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value, RetrievalError> {
    let status = response.status();
    if !status.is_success() {
        let details = response.text().await.unwrap_or_default();
        return Err(RetrievalError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {details}"),
        });
    }
    Ok(response.json().await?)
}

fn record_metadata(chunk: &DocumentChunk) -> Value {
    json!({
        "document_id": chunk.document_id,
        "chunk_index": chunk.chunk_index,
        "char_start": chunk.char_start,
        "char_end": chunk.char_end,
        "page_start": chunk.page_start,
        "page_end": chunk.page_end,
    })
}

fn upsert_body(records: &[EmbeddingRecord]) -> Value {
    json!({
        "ids": records.iter().map(|record| record.chunk.chunk_id.as_str()).collect::<Vec<_>>(),
        "embeddings": records.iter().map(|record| &record.vector).collect::<Vec<_>>(),
        "documents": records.iter().map(|record| record.chunk.text.as_str()).collect::<Vec<_>>(),
        "metadatas": records.iter().map(|record| record_metadata(&record.chunk)).collect::<Vec<_>>(),
    })
}

fn metadata_u64(metadata: &Value, key: &str) -> u64 {
    metadata.get(key).and_then(Value::as_u64).unwrap_or_default()
}

/// Converts the first result row of a query response into scored chunks.
/// Chroma reports cosine distance; similarity is `1 - distance`.
fn parse_query_response(parsed: &Value) -> Result<Vec<ScoredChunk>, RetrievalError> {
    let row = |key: &str| {
        parsed
            .pointer(&format!("/{key}/0"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let ids = row("ids");
    let documents = row("documents");
    let metadatas = row("metadatas");
    let distances = row("distances");

    if documents.len() != ids.len() || metadatas.len() != ids.len() || distances.len() != ids.len()
    {
        return Err(RetrievalError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "query response columns have different lengths".to_string(),
        });
    }

    let mut result = Vec::with_capacity(ids.len());
    for (position, id) in ids.iter().enumerate() {
        let metadata = &metadatas[position];
        let distance = distances[position].as_f64().unwrap_or(1.0);
        result.push(ScoredChunk {
            chunk: DocumentChunk {
                chunk_id: id.as_str().unwrap_or_default().to_string(),
                document_id: metadata
                    .get("document_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                chunk_index: metadata_u64(metadata, "chunk_index"),
                text: documents[position].as_str().unwrap_or_default().to_string(),
                char_start: metadata_u64(metadata, "char_start") as usize,
                char_end: metadata_u64(metadata, "char_end") as usize,
                page_start: metadata_u64(metadata, "page_start") as u32,
                page_end: metadata_u64(metadata, "page_end") as u32,
            },
            score: 1.0 - distance,
        });
    }

    Ok(result)
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn ensure_ready(&self, dimensions: usize) -> Result<(), RetrievalError> {
        let parsed = self
            .post(
                "api/v1/collections",
                json!({
                    "name": self.collection,
                    "get_or_create": true,
                    "metadata": { "hnsw:space": "cosine", "dimensions": dimensions },
                }),
            )
            .await?;

        let id = parsed
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RetrievalError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "collection response has no id".to_string(),
            })?
            .to_string();

        if let Some(existing) = parsed
            .pointer("/metadata/dimensions")
            .and_then(Value::as_u64)
        {
            if existing as usize != dimensions {
                return Err(RetrievalError::Request(format!(
                    "collection {} holds {existing}-dimensional vectors, embedder produces {dimensions}",
                    self.collection
                )));
            }
        }

        info!(collection = %self.collection, collection_id = %id, "chroma collection ready");
        *self.collection_id.write().await = Some(id);
        Ok(())
    }

    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> Result<(), RetrievalError> {
        if records.is_empty() {
            return Ok(());
        }

        let id = self.collection_id().await?;
        self.post(
            &format!("api/v1/collections/{id}/upsert"),
            upsert_body(records),
        )
        .await?;

        debug!(collection = %self.collection, records = records.len(), "chroma upsert");
        Ok(())
    }

    async fn nearest(
        &self,
        document_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let id = self.collection_id().await?;
        let parsed = self
            .post(
                &format!("api/v1/collections/{id}/query"),
                json!({
                    "query_embeddings": [query_vector],
                    "n_results": top_k,
                    "where": { "document_id": document_id },
                    "include": ["documents", "metadatas", "distances"],
                }),
            )
            .await?;

        parse_query_response(&parsed)
    }

    async fn count_chunks(&self, document_id: &str) -> Result<usize, RetrievalError> {
        let id = self.collection_id().await?;
        let parsed = self
            .post(
                &format!("api/v1/collections/{id}/get"),
                json!({
                    "where": { "document_id": document_id },
                    "include": [],
                }),
            )
            .await?;

        Ok(parsed
            .get("ids")
            .and_then(Value::as_array)
            .map_or(0, Vec::len))
    }

    async fn reset(&self) -> Result<(), RetrievalError> {
        let response = self
            .client
            .delete(self.url(&format!("api/v1/collections/{}", self.collection))?)
            .send()
            .await?;

        // Deleting a collection that was never created is not an error for a reset.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            read_json(response).await?;
        }

        *self.collection_id.write().await = None;
        info!(collection = %self.collection, "chroma collection reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("doc-{index:05}"),
            document_id: "doc".to_string(),
            chunk_index: index,
            text: format!("text {index}"),
            char_start: 10 * index as usize,
            char_end: 10 * index as usize + 6,
            page_start: 1,
            page_end: 2,
        }
    }

    #[test]
    fn endpoint_gets_trailing_slash() {
        let index = ChromaIndex::new("http://localhost:8000/chroma", "c", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            index.url("api/v1/collections").unwrap().as_str(),
            "http://localhost:8000/chroma/api/v1/collections"
        );
    }

    #[test]
    fn upsert_body_keeps_columns_aligned() {
        let records = vec![
            EmbeddingRecord {
                chunk: chunk(0),
                vector: vec![0.1, 0.2],
            },
            EmbeddingRecord {
                chunk: chunk(1),
                vector: vec![0.3, 0.4],
            },
        ];
        let body = upsert_body(&records);

        assert_eq!(body["ids"], json!(["doc-00000", "doc-00001"]));
        assert_eq!(body["documents"], json!(["text 0", "text 1"]));
        assert_eq!(body["embeddings"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["metadatas"][1]["chunk_index"], json!(1));
        assert_eq!(body["metadatas"][1]["document_id"], json!("doc"));
    }

    #[test]
    fn query_response_is_parsed_into_chunks() {
        let parsed = json!({
            "ids": [["doc-00001", "doc-00000"]],
            "documents": [["text 1", "text 0"]],
            "metadatas": [[
                {"document_id": "doc", "chunk_index": 1, "char_start": 10, "char_end": 16, "page_start": 1, "page_end": 2},
                {"document_id": "doc", "chunk_index": 0, "char_start": 0, "char_end": 6, "page_start": 1, "page_end": 1}
            ]],
            "distances": [[0.25, 0.5]],
        });

        let hits = parse_query_response(&parsed).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk, chunk(1));
        assert!((hits[0].score - 0.75).abs() < 1e-9);
        assert_eq!(hits[1].chunk.chunk_index, 0);
    }

    #[test]
    fn ragged_query_response_is_rejected() {
        let parsed = json!({
            "ids": [["a", "b"]],
            "documents": [["only one"]],
            "metadatas": [[{}, {}]],
            "distances": [[0.1, 0.2]],
        });
        assert!(matches!(
            parse_query_response(&parsed),
            Err(RetrievalError::BackendResponse { .. })
        ));
    }

    #[tokio::test]
    async fn writes_before_ensure_ready_are_refused() {
        let index =
            ChromaIndex::new("http://localhost:8000", "c", Duration::from_secs(1)).unwrap();
        let result = index
            .upsert_records(&[EmbeddingRecord {
                chunk: chunk(0),
                vector: vec![1.0],
            }])
            .await;
        assert!(matches!(result, Err(RetrievalError::NotReady(_))));
    }
}
