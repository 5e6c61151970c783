//! Test doubles for the remote services and a ready-to-use `AppState`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::{Config, DatabaseConfig, ExtractorConfig, OpenAiConfig};
use crate::embedding::{Embedder, EmbeddingError, EmbeddingVector};
use crate::extraction::{require_text, ExtractionError, TextExtractor};
use crate::pipeline::upload::UploadedFile;
use crate::state::AppState;
use crate::store::memory::InMemoryDatabase;

/// Treats every uploaded file as UTF-8 text and counts invocations.
#[derive(Default)]
pub struct PlainTextExtractor {
    calls: AtomicUsize,
}

impl PlainTextExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(path).await?;
        require_text(text)
    }
}

/// Bag-of-words embedder. Every distinct lowercase token gets its own
/// dimension, so texts sharing words have positive cosine similarity and
/// texts sharing none score zero.
pub struct VocabularyEmbedder {
    dimensions: usize,
    vocabulary: Mutex<HashMap<String, usize>>,
}

impl VocabularyEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vocabulary: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let mut values = vec![0.0; self.dimensions];
        let mut vocabulary = self.vocabulary.lock();
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let next = vocabulary.len() % self.dimensions;
            let slot = *vocabulary.entry(token).or_insert(next);
            values[slot] += 1.0;
        }
        Ok(EmbeddingVector::from(values))
    }

    fn model(&self) -> &str {
        "vocabulary-test"
    }
}

pub fn test_config(upload_dir: &Path, dimensions: usize) -> Config {
    Config {
        openai: OpenAiConfig {
            api_key: "test".to_string(),
            endpoint: "http://127.0.0.1:9".to_string(),
            api_version: "2023-05-15".to_string(),
            embeddings_model: "vocabulary-test".to_string(),
        },
        extractor: ExtractorConfig::LocalPdf,
        database: DatabaseConfig::Memory,
        jobs_collection: "jobs_collections".to_string(),
        resumes_collection: "applicants_resumes".to_string(),
        embedding_dimensions: dimensions,
        default_top_k: 1,
        upload_dir: upload_dir.to_path_buf(),
        max_upload_bytes: 1024 * 1024,
        http_timeout_secs: 5,
        port: 0,
        rust_log: "debug".to_string(),
    }
}

/// In-memory state plus a handle on the extractor for call assertions.
pub fn test_state(upload_dir: &Path, dimensions: usize) -> (AppState, Arc<PlainTextExtractor>) {
    let extractor = Arc::new(PlainTextExtractor::default());
    let state = AppState {
        config: test_config(upload_dir, dimensions),
        extractor: extractor.clone(),
        embedder: Arc::new(VocabularyEmbedder::new(dimensions)),
        db: Arc::new(InMemoryDatabase::new()),
    };
    (state, extractor)
}

pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn upload(filename: &str, contents: &str) -> UploadedFile {
    UploadedFile {
        filename: filename.to_string(),
        data: Bytes::from(contents.to_string()),
    }
}

/// Encodes `(filename, contents)` pairs as a multipart body under field `file`.
pub fn multipart_body(boundary: &str, files: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (filename, contents) in files {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vocabulary_embedder_is_fixed_length() {
        let embedder = VocabularyEmbedder::new(16);
        let v = embedder.embed("Go, go and Rust").await.unwrap();
        assert_eq!(v.dimensions(), 16);
        assert_eq!(v.as_slice()[0], 2.0);
        assert_eq!(v.as_slice().iter().sum::<f64>(), 4.0);
    }
}
