//! Text Extractor: pulls plain text out of an uploaded PDF.
//!
//! Default backend is Azure Document Intelligence (`DocumentAnalysisClient`);
//! `PdfTextExtractor` parses locally for development. Swapped via `EXTRACTOR_BACKEND`.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub mod azure;
pub mod local;

pub use azure::DocumentAnalysisClient;
pub use local::PdfTextExtractor;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("analysis request was accepted without an Operation-Location header")]
    MissingOperationLocation,

    #[error("document analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("document analysis still running after {polls} polls")]
    Timeout { polls: u32 },

    #[error("PDF parsing failed: {0}")]
    Pdf(String),

    #[error("no text could be extracted from the document")]
    EmptyContent,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts the text of the file at `path`. Never returns blank text.
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

pub(crate) fn require_text(text: String) -> Result<String, ExtractionError> {
    if text.trim().is_empty() {
        Err(ExtractionError::EmptyContent)
    } else {
        Ok(text)
    }
}
