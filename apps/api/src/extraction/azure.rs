use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::{require_text, ExtractionError, TextExtractor};

const API_VERSION: &str = "2023-07-31";
const MODEL_ID: &str = "prebuilt-document";
const LOCALE: &str = "en-US";
/// Upper bound on status polls for one analysis operation.
const MAX_POLLS: u32 = 120;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ServiceError,
}

#[derive(Debug)]
enum PollState {
    Running,
    Succeeded(String),
}

/// Azure Document Intelligence client running the prebuilt document model.
///
/// Submits the PDF once and polls the returned operation until it settles.
/// A failed analysis is reported, never resubmitted.
#[derive(Clone)]
pub struct DocumentAnalysisClient {
    client: Client,
    endpoint: String,
    key: String,
    poll_interval: Duration,
}

impl DocumentAnalysisClient {
    pub fn new(endpoint: String, key: String, timeout: Duration) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{MODEL_ID}:analyze?api-version={API_VERSION}&locale={LOCALE}",
            self.endpoint
        )
    }

    async fn submit(&self, pdf: Vec<u8>) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(pdf)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, body));
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(ExtractionError::MissingOperationLocation)
    }

    async fn analyze(&self, path: &Path) -> Result<String, ExtractionError> {
        let pdf = tokio::fs::read(path).await?;
        let operation_url = self.submit(pdf).await?;
        let content = self.poll(&operation_url).await?;
        require_text(content)
    }

    async fn poll(&self, operation_url: &str) -> Result<String, ExtractionError> {
        for attempt in 1..=MAX_POLLS {
            let response = self
                .client
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .send()
                .await?;

            let status = response.status();
            let retry_after = retry_after(response.headers()).unwrap_or(self.poll_interval);
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(api_error(status, body));
            }

            let operation: AnalyzeOperation = response.json().await?;
            match interpret(operation)? {
                PollState::Succeeded(content) => return Ok(content),
                PollState::Running => {
                    debug!("Document analysis still running (poll {attempt}/{MAX_POLLS})");
                    tokio::time::sleep(retry_after).await;
                }
            }
        }

        Err(ExtractionError::Timeout { polls: MAX_POLLS })
    }
}

#[async_trait]
impl TextExtractor for DocumentAnalysisClient {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let result = self.analyze(path).await;
        match &result {
            Ok(text) => info!(
                "Extracted {} characters from {}",
                text.len(),
                path.display()
            ),
            Err(e) => error!("Error processing document {}: {e}", path.display()),
        }
        result
    }
}

fn interpret(operation: AnalyzeOperation) -> Result<PollState, ExtractionError> {
    match operation.status.as_str() {
        "notStarted" | "running" => Ok(PollState::Running),
        "succeeded" => operation
            .analyze_result
            .map(|r| PollState::Succeeded(r.content))
            .ok_or(ExtractionError::EmptyContent),
        _ => {
            let detail = operation
                .error
                .map(|e| match e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message,
                })
                .unwrap_or_else(|| format!("operation ended with status '{}'", operation.status));
            Err(ExtractionError::AnalysisFailed(detail))
        }
    }
}

fn api_error(status: StatusCode, body: String) -> ExtractionError {
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    ExtractionError::Api {
        status: status.as_u16(),
        message,
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(json: &str) -> AnalyzeOperation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_analyze_url_uses_prebuilt_model_and_locale() {
        let client = DocumentAnalysisClient::new(
            "https://di.cognitiveservices.azure.com/".to_string(),
            "key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.analyze_url(),
            "https://di.cognitiveservices.azure.com/formrecognizer/documentModels/prebuilt-document:analyze?api-version=2023-07-31&locale=en-US"
        );
    }

    #[test]
    fn test_running_operation_keeps_polling() {
        let state = interpret(operation(r#"{"status": "running"}"#)).unwrap();
        assert!(matches!(state, PollState::Running));
        let state = interpret(operation(r#"{"status": "notStarted"}"#)).unwrap();
        assert!(matches!(state, PollState::Running));
    }

    #[test]
    fn test_succeeded_operation_returns_content() {
        let op = operation(
            r#"{"status": "succeeded", "analyzeResult": {"apiVersion": "2023-07-31", "content": "Senior Backend Engineer"}}"#,
        );
        match interpret(op).unwrap() {
            PollState::Succeeded(content) => assert_eq!(content, "Senior Backend Engineer"),
            PollState::Running => panic!("expected success"),
        }
    }

    #[test]
    fn test_failed_operation_reports_service_error() {
        let op = operation(
            r#"{"status": "failed", "error": {"code": "InvalidContent", "message": "The file is corrupted."}}"#,
        );
        let err = interpret(op).unwrap_err();
        assert!(err.to_string().contains("InvalidContent"));
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn test_api_error_prefers_service_message() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"code": "401", "message": "Access denied due to invalid subscription key."}}"#
                .to_string(),
        );
        match err {
            ExtractionError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.starts_with("Access denied"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_parsed_in_seconds() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        assert_eq!(retry_after(&header::HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_extraction_error() {
        let client = DocumentAnalysisClient::new(
            "http://127.0.0.1:9".to_string(),
            "key".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client
            .extract(Path::new("/nonexistent/resume.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
