pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion
        .route("/api/v1/jobs", post(handlers::handle_upload_job))
        .route("/api/v1/resumes", post(handlers::handle_upload_resumes))
        // Ranking
        .route("/api/v1/results", get(handlers::handle_results))
        .route(
            "/api/v1/indexes/setup",
            post(handlers::handle_setup_indexes),
        )
        .route("/uploads/:filename", get(handlers::handle_uploaded_file))
        .layer(body_limit)
        .with_state(state)
}
