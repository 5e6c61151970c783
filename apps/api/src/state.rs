use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::extraction::TextExtractor;
use crate::store::DocumentDatabase;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once at startup; the clients inside are safe to share across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Document-analysis backend. Default: Azure Document Intelligence. Swap via EXTRACTOR_BACKEND.
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    /// Document database. Default: Cosmos DB. Swap via DATABASE_BACKEND.
    pub db: Arc<dyn DocumentDatabase>,
}
