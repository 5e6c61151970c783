mod config;
mod embedding;
mod errors;
mod extraction;
mod indexing;
mod pipeline;
mod ranking;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, DatabaseConfig, ExtractorConfig};
use crate::embedding::{AzureOpenAiEmbedder, Embedder};
use crate::extraction::{DocumentAnalysisClient, PdfTextExtractor, TextExtractor};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::memory::InMemoryDatabase;
use crate::store::mongo::CosmosMongoDatabase;
use crate::store::{ensure_collection, DocumentDatabase};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ResumeRank API v{}", env!("CARGO_PKG_VERSION"));

    let timeout = Duration::from_secs(config.http_timeout_secs);
    let extractor = build_extractor(&config, timeout)?;

    let embedder: Arc<dyn Embedder> = Arc::new(AzureOpenAiEmbedder::new(
        &config.openai,
        config.embedding_dimensions,
        timeout,
    )?);
    info!(
        "Embedding client initialized (model: {}, {} dimensions)",
        embedder.model(),
        config.embedding_dimensions
    );

    let db = build_database(&config).await?;
    info!("Document database initialized ({})", db.backend_name());

    for collection in [&config.jobs_collection, &config.resumes_collection] {
        ensure_collection(db.as_ref(), collection).await?;
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create {}", config.upload_dir.display()))?;

    let state = AppState {
        config: config.clone(),
        extractor,
        embedder,
        db,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_extractor(config: &Config, timeout: Duration) -> Result<Arc<dyn TextExtractor>> {
    match &config.extractor {
        ExtractorConfig::Azure { endpoint, key } => {
            info!("Text extraction via Azure Document Intelligence at {endpoint}");
            Ok(Arc::new(DocumentAnalysisClient::new(
                endpoint.clone(),
                key.clone(),
                timeout,
            )?))
        }
        ExtractorConfig::LocalPdf => {
            info!("Text extraction via local PDF parsing");
            Ok(Arc::new(PdfTextExtractor))
        }
    }
}

async fn build_database(config: &Config) -> Result<Arc<dyn DocumentDatabase>> {
    match &config.database {
        DatabaseConfig::Cosmos {
            user,
            password,
            database_name,
            ..
        } => {
            let uri = config
                .database
                .connection_uri()
                .context("Cosmos configuration without a connection string")?;
            let db = CosmosMongoDatabase::connect(&uri, user, password, database_name).await?;
            Ok(Arc::new(db))
        }
        DatabaseConfig::Memory => Ok(Arc::new(InMemoryDatabase::new())),
    }
}
