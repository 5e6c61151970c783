use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{error, info};

use super::{require_text, ExtractionError, TextExtractor};

/// Parses PDFs in-process with `pdf-extract`. Layout-heavy documents come
/// out noticeably worse than with the cloud model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let owned: PathBuf = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || parse_pdf(&owned))
            .await
            .map_err(|e| ExtractionError::Pdf(format!("extraction task failed: {e}")))
            .and_then(|r| r)
            .and_then(require_text);

        match &result {
            Ok(text) => info!(
                "Extracted {} characters from {} (local)",
                text.len(),
                path.display()
            ),
            Err(e) => error!("Error processing document {}: {e}", path.display()),
        }
        result
    }
}

fn parse_pdf(path: &Path) -> Result<String, ExtractionError> {
    // Surface unreadable files as I/O errors before the parser sees them.
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))
}
