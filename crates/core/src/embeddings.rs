use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Local embedder hashing character trigrams into a fixed number of buckets.
/// Deterministic and offline; good enough for lexical overlap.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

/// Client for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            model = %self.config.model,
            batch_size = texts.len(),
            "embedding batch"
        );

        let mut request = self.client.post(self.endpoint()).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                EmbeddingError::Timeout(self.config.timeout.as_secs())
            } else {
                EmbeddingError::Http(error)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ProviderErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            error!(%status, model = %self.config.model, "embedding provider error");
            return Err(EmbeddingError::Provider {
                provider: "openai".to_string(),
                message: format!("{status}: {detail}"),
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }

        parsed
            .data
            .sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        let vectors = parsed
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect::<Vec<_>>();

        if let Some(bad) = vectors
            .iter()
            .find(|vector| vector.len() != self.config.dimensions)
        {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

/// Embedder selected at startup.
pub enum EmbeddingBackend {
    Hashing(HashingEmbedder),
    OpenAi(OpenAiEmbedder),
}

impl EmbeddingBackend {
    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingBackend::Hashing(_) => "hashing",
            EmbeddingBackend::OpenAi(_) => "openai",
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingBackend {
    fn dimensions(&self) -> usize {
        match self {
            EmbeddingBackend::Hashing(inner) => inner.dimensions(),
            EmbeddingBackend::OpenAi(inner) => inner.dimensions(),
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            EmbeddingBackend::Hashing(inner) => inner.embed_batch(texts).await,
            EmbeddingBackend::OpenAi(inner) => inner.embed_batch(texts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("The capital of France is Paris.").await.unwrap();
        let second = embedder.embed("The capital of France is Paris.").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hashing_embedder_outputs_expected_length() {
        let embedder = HashingEmbedder { dimensions: 32 };
        let vectors = embedder.embed_batch(&["abc", "defg"]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 32));
    }

    #[test]
    fn hashing_vectors_are_unit_length() {
        let vector = HashingEmbedder::default().embed_text("hydraulic pump pressure");
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let vector = HashingEmbedder { dimensions: 8 }.embed_text("");
        assert_eq!(vector, vec![0.0; 8]);
    }

    #[test]
    fn openai_endpoint_joins_base_url() {
        let embedder = OpenAiEmbedder::new(OpenAiEmbeddingConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            api_key: None,
            model: DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_OPENAI_EMBEDDING_DIMENSIONS,
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:9000/v1/embeddings");
    }
}
