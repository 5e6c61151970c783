//! Ranking pipeline: upload, extract, embed and store, then rank on demand.
//!
//! Ingestion and ranking are independent operations; the HTTP layer composes
//! them. Every step short-circuits on failure, nothing absent is passed on.

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::embedding::EmbeddingVector;
use crate::errors::AppError;
use crate::indexing::{ensure_index, setup_vector_indexing, IndexSetupOutcome};
use crate::ranking::{rank, shape, ShapedResults};
use crate::state::AppState;
use crate::store::{self, DocumentId};
use crate::pipeline::upload::{save_upload, UploadedFile};

pub mod handlers;
pub mod upload;

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub stored: Vec<DocumentId>,
    /// Files that could not be extracted, embedded or stored.
    pub failed: Vec<String>,
}

/// Extracts, embeds and stores one job description.
pub async fn ingest_job_description(state: &AppState, path: &Path) -> Result<DocumentId, AppError> {
    let (text, vector) = prepare_document(state, path).await?;
    let id = store::insert(
        state.db.as_ref(),
        &state.config.jobs_collection,
        &text,
        vector,
        state.config.embedding_dimensions,
    )
    .await?;
    info!("Job description {} stored as {id}", path.display());
    Ok(id)
}

/// Extracts, embeds and stores one resume.
pub async fn ingest_resume(state: &AppState, path: &Path) -> Result<DocumentId, AppError> {
    let (text, vector) = prepare_document(state, path).await?;
    let id = store::insert(
        state.db.as_ref(),
        &state.config.resumes_collection,
        &text,
        vector,
        state.config.embedding_dimensions,
    )
    .await?;
    info!("Resume {} stored as {id}", path.display());
    Ok(id)
}

/// Saves and ingests uploaded resumes one after another, so a later file
/// with the same name only replaces the copy on disk after the earlier one is
/// stored. A file that fails at any step is recorded in `failed`; the others
/// are still stored.
pub async fn ingest_resumes(state: &AppState, files: &[UploadedFile]) -> IngestReport {
    let mut report = IngestReport::default();
    for file in files {
        let stored = match save_upload(&state.config.upload_dir, file).await {
            Ok(path) => ingest_resume(state, &path).await,
            Err(e) => Err(anyhow::Error::from(e).into()),
        };
        match stored {
            Ok(id) => report.stored.push(id),
            Err(e) => {
                error!("Error during resume processing for {}: {e}", file.filename);
                report.failed.push(file.filename.clone());
            }
        }
    }

    info!(
        "Resume batch processed: {} stored, {} failed",
        report.stored.len(),
        report.failed.len()
    );
    report
}

/// Ensures both vector indexes, then ranks resumes against the job.
/// Index problems are logged; the search itself reports a missing index.
pub async fn rank_against_job(
    state: &AppState,
    job_id: Option<&DocumentId>,
    top_k: usize,
) -> Result<ShapedResults, AppError> {
    let config = &state.config;
    for collection in [&config.resumes_collection, &config.jobs_collection] {
        if let Err(e) = ensure_index(state.db.as_ref(), collection, config.embedding_dimensions).await
        {
            warn!("Continuing without confirmed vector index: {e}");
        }
    }

    let ranked = rank(
        state.db.as_ref(),
        &config.jobs_collection,
        &config.resumes_collection,
        job_id,
        top_k,
    )
    .await?;
    Ok(shape(&ranked))
}

/// Provisions the vector index on both collections.
pub async fn setup_indexes(state: &AppState) -> Vec<IndexSetupOutcome> {
    let config = &state.config;
    setup_vector_indexing(
        state.db.as_ref(),
        &[config.resumes_collection.as_str(), config.jobs_collection.as_str()],
        config.embedding_dimensions,
    )
    .await
}

async fn prepare_document(
    state: &AppState,
    path: &Path,
) -> Result<(String, EmbeddingVector), AppError> {
    let text = state.extractor.extract(path).await?;
    let vector = state.embedder.embed(&text).await?;
    Ok((text, vector))
}
