//! Thin HTTP client over the chatdoc API, used by the terminal commands.

use crate::server::AskRequest;
use chatdoc_core::{Answer, HealthReport, UploadReceipt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const ASK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status} ({kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(api_url: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: api_url.to_string(),
            reason,
        };

        let mut base = Url::parse(api_url.trim()).map_err(|error| invalid(error.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base.scheme())));
        }
        if base.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            client: Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|error| ClientError::InvalidUrl {
                url: format!("{}{path}", self.base),
                reason: error.to_string(),
            })
    }

    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let url = self.endpoint("")?;
        let response = self
            .client
            .get(url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|error| request_error(&url, error))?;
        decode(response).await
    }

    pub async fn upload_pdf(&self, path: &Path) -> Result<UploadReceipt, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        debug!(filename = %filename, bytes = bytes.len(), "uploading pdf");

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);

        let url = self.endpoint("upload-pdf/")?;
        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|error| request_error(&url, error))?;
        decode(response).await
    }

    pub async fn ask(&self, document_id: &str, question: &str) -> Result<Answer, ClientError> {
        let url = self.endpoint("ask-question/")?;
        let body = AskRequest {
            document_id: document_id.to_string(),
            question: question.to_string(),
        };
        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .timeout(ASK_TIMEOUT)
            .send()
            .await
            .map_err(|error| request_error(&url, error))?;
        decode(response).await
    }
}

fn request_error(url: &Url, error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout(url.to_string())
    } else {
        ClientError::Http(error)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

/// Reads the `{"error": {"kind", "message"}}` envelope, falling back to the raw body.
fn api_error(status: u16, body: &str) -> ClientError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|value| value.pointer(&format!("/error/{name}")))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    ClientError::Api {
        status,
        kind: field("kind").unwrap_or_else(|| "unknown".to_string()),
        message: field("message").unwrap_or_else(|| body.trim().to_string()),
    }
}
