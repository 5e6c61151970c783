use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::indexing::IndexSetupOutcome;
use crate::pipeline::upload::{is_allowed_file, save_upload, secure_filename, UploadedFile};
use crate::pipeline::{ingest_job_description, ingest_resumes, rank_against_job, setup_indexes};
use crate::ranking::ShapedResult;
use crate::state::AppState;
use crate::store::DocumentId;

const INVALID_UPLOAD: &str = "Invalid file or no file selected";

#[derive(Serialize)]
pub struct JobUploadResponse {
    pub job_id: DocumentId,
    pub filename: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ResumeUploadResponse {
    pub stored: Vec<DocumentId>,
    pub failed: Vec<String>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct ResultsQuery {
    pub job_id: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub job_id: Option<DocumentId>,
    pub results: Vec<ShapedResult>,
    pub skipped: usize,
}

/// Collects every `file` part. Any part with a missing or disallowed name
/// rejects the whole request before its bytes are read.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| is_allowed_file(name))
            .and_then(secure_filename)
            .filter(|name| is_allowed_file(name))
            .ok_or_else(|| AppError::Validation(INVALID_UPLOAD.to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        files.push(UploadedFile { filename, data });
    }
    if files.is_empty() {
        return Err(AppError::Validation(INVALID_UPLOAD.to_string()));
    }
    Ok(files)
}

/// POST /api/v1/jobs
pub async fn handle_upload_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobUploadResponse>), AppError> {
    let mut files = read_uploads(multipart).await?;
    if files.len() != 1 {
        return Err(AppError::Validation(
            "Exactly one job description file is expected".to_string(),
        ));
    }
    let file = files.remove(0);
    let path = save_upload(&state.config.upload_dir, &file)
        .await
        .map_err(anyhow::Error::from)?;

    let job_id = ingest_job_description(&state, &path).await?;
    Ok((
        StatusCode::CREATED,
        Json(JobUploadResponse {
            job_id,
            filename: file.filename,
            message: "Job description uploaded successfully".to_string(),
        }),
    ))
}

/// POST /api/v1/resumes
pub async fn handle_upload_resumes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ResumeUploadResponse>, AppError> {
    let files = read_uploads(multipart).await?;
    let report = ingest_resumes(&state, &files).await;
    if report.stored.is_empty() {
        return Err(AppError::UnprocessableEntity(format!(
            "None of the {} resumes could be processed",
            report.failed.len()
        )));
    }
    let message = format!("{} resumes uploaded successfully", report.stored.len());
    Ok(Json(ResumeUploadResponse {
        stored: report.stored,
        failed: report.failed,
        message,
    }))
}

/// GET /api/v1/results?job_id=&top_k=
pub async fn handle_results(
    State(state): State<AppState>,
    Query(params): Query<ResultsQuery>,
) -> Result<Json<ResultsResponse>, AppError> {
    let top_k = params.top_k.unwrap_or(state.config.default_top_k);
    if top_k == 0 {
        return Err(AppError::Validation("top_k must be at least 1".to_string()));
    }
    let job_id = params.job_id.map(DocumentId::new);

    let shaped = rank_against_job(&state, job_id.as_ref(), top_k).await?;
    info!(
        "Returning {} ranked resumes ({} skipped)",
        shaped.results.len(),
        shaped.skipped
    );
    Ok(Json(ResultsResponse {
        job_id,
        results: shaped.results,
        skipped: shaped.skipped,
    }))
}

/// POST /api/v1/indexes/setup
pub async fn handle_setup_indexes(State(state): State<AppState>) -> Json<Vec<IndexSetupOutcome>> {
    Json(setup_indexes(&state).await)
}

/// GET /uploads/:filename
pub async fn handle_uploaded_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if secure_filename(&filename).as_deref() != Some(filename.as_str()) {
        warn!("Rejected upload lookup for {filename:?}");
        return Err(AppError::NotFound(format!("File {filename} not found")));
    }

    let data = match tokio::fs::read(state.config.upload_dir.join(&filename)).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("File {filename} not found")));
        }
        Err(e) => return Err(anyhow::Error::from(e).into()),
    };

    let content_type = if is_allowed_file(&filename) {
        "application/pdf"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
