//! Embedding Generator: turns extracted document text into a fixed-length vector.
//!
//! Vectors come from an Azure OpenAI embeddings deployment. Components depend on
//! the `Embedder` trait; `AppState` holds an `Arc<dyn Embedder>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::OpenAiConfig;

/// Ordered embedding components. Stored and compared without any rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f64>);

impl EmbeddingVector {
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for EmbeddingVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding response contained no vector")]
    MissingVector,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;

    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Azure OpenAI embeddings client. One request per document; no batching,
/// no truncation and no retries.
#[derive(Clone)]
pub struct AzureOpenAiEmbedder {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl AzureOpenAiEmbedder {
    pub fn new(
        config: &OpenAiConfig,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: embeddings_url(config),
            api_key: config.api_key.clone(),
            model: config.embeddings_model.clone(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for AzureOpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: text })
            .send()
            .await
            .map_err(|e| {
                error!("Error generating embeddings: {e}");
                EmbeddingError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!("Embeddings API returned {status}: {message}");
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if let Some(usage) = &parsed.usage {
            debug!(
                "Embedding generated with {} (prompt_tokens={})",
                self.model, usage.prompt_tokens
            );
        }

        let vector = first_embedding(parsed)?;
        check_dimensions(vector, self.dimensions)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn embeddings_url(config: &OpenAiConfig) -> String {
    format!(
        "{}/openai/deployments/{}/embeddings?api-version={}",
        config.endpoint.trim_end_matches('/'),
        config.embeddings_model,
        config.api_version
    )
}

fn first_embedding(response: EmbeddingResponse) -> Result<EmbeddingVector, EmbeddingError> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| EmbeddingVector::from(d.embedding))
        .filter(|v| v.dimensions() > 0)
        .ok_or(EmbeddingError::MissingVector)
}

fn check_dimensions(
    vector: EmbeddingVector,
    expected: usize,
) -> Result<EmbeddingVector, EmbeddingError> {
    if vector.dimensions() != expected {
        error!(
            "Embedding has {} dimensions, expected {expected}",
            vector.dimensions()
        );
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.dimensions(),
        });
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_config(endpoint: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_key: "key".to_string(),
            endpoint: endpoint.to_string(),
            api_version: "2023-05-15".to_string(),
            embeddings_model: "embeddings".to_string(),
        }
    }

    #[test]
    fn test_embeddings_url_strips_trailing_slash() {
        let url = embeddings_url(&openai_config("https://example.openai.azure.com/"));
        assert_eq!(
            url,
            "https://example.openai.azure.com/openai/deployments/embeddings/embeddings?api-version=2023-05-15"
        );
    }

    #[test]
    fn test_first_embedding_takes_first_entry() {
        let body = r#"{
            "data": [
                {"object": "embedding", "index": 0, "embedding": [0.25, -0.5, 0.125]},
                {"object": "embedding", "index": 1, "embedding": [9.0, 9.0, 9.0]}
            ],
            "usage": {"prompt_tokens": 7, "total_tokens": 7}
        }"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let vector = first_embedding(response).unwrap();
        assert_eq!(vector.as_slice(), &[0.25, -0.5, 0.125]);
    }

    #[test]
    fn test_first_embedding_empty_data_is_error() {
        let response: EmbeddingResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(matches!(
            first_embedding(response),
            Err(EmbeddingError::MissingVector)
        ));
    }

    #[tokio::test]
    async fn test_blank_text_rejected_without_request() {
        // Unroutable endpoint: reaching the network would surface as Http, not EmptyInput.
        let embedder = AzureOpenAiEmbedder::new(
            &openai_config("http://127.0.0.1:9"),
            3,
            Duration::from_secs(1),
        )
        .unwrap();
        let err = embedder.embed("   \n").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput));
    }

    #[test]
    fn test_vector_serializes_as_plain_array() {
        let v = EmbeddingVector::from(vec![1.5, 2.0]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.5,2.0]");
    }

    #[test]
    fn test_check_dimensions() {
        let v = EmbeddingVector::from(vec![0.1, 0.2, 0.3]);
        assert_eq!(check_dimensions(v.clone(), 3).unwrap(), v);
        assert!(matches!(
            check_dimensions(v, 4),
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    /// Serves one canned embeddings response on a local port.
    async fn serve_once(status: u16, body: serde_json::Value) -> String {
        use axum::{http::StatusCode, routing::post, Json, Router};

        let app = Router::new().route(
            "/openai/deployments/embeddings/embeddings",
            post(move || async move {
                (StatusCode::from_u16(status).unwrap(), Json(body))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_short_vector_from_service_is_dimension_mismatch() {
        let endpoint = serve_once(
            200,
            serde_json::json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]}),
        )
        .await;
        let embedder =
            AzureOpenAiEmbedder::new(&openai_config(&endpoint), 4, Duration::from_secs(5)).unwrap();

        let err = embedder.embed("Senior Backend Engineer").await.unwrap_err();

        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_service_error_status_is_api_error() {
        let endpoint = serve_once(
            400,
            serde_json::json!({"error": {"message": "Input too long"}}),
        )
        .await;
        let embedder =
            AzureOpenAiEmbedder::new(&openai_config(&endpoint), 4, Duration::from_secs(5)).unwrap();

        let err = embedder.embed("Senior Backend Engineer").await.unwrap_err();

        match err {
            EmbeddingError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Input too long");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
