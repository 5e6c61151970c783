//! Document Store: the job-description and resume collections.
//!
//! All database access goes through the `DocumentDatabase` trait so the
//! Cosmos (MongoDB vCore) backend and the in-memory backend are interchangeable.
//! `AppState` carries an `Arc<dyn DocumentDatabase>` chosen at startup.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::embedding::EmbeddingVector;
use crate::indexing::VectorIndexDescriptor;

pub mod memory;
pub mod mongo;

/// Field holding the extracted document text.
pub const TEXT_FIELD: &str = "document_data";

/// Identifier assigned by the database on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape shared by both collections. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document_data: String,
    #[serde(rename = "contentVector")]
    pub content_vector: EmbeddingVector,
    pub created_at: DateTime<Utc>,
}

/// Handle to a collection that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub created: bool,
}

/// Errors reported by a database backend.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("write rejected: {0}")]
    Write(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("conflicting index definition: {0}")]
    IndexConflict(String),

    #[error("invalid document id '{0}'")]
    InvalidId(String),

    #[error("malformed stored document: {0}")]
    Malformed(String),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bulk write error on '{collection}': {message}")]
    BulkWrite { collection: String, message: String },

    #[error("vector has {actual} dimensions, expected {expected}")]
    InvalidVector { expected: usize, actual: usize },

    #[error("database error on '{collection}': {source}")]
    Database {
        collection: String,
        #[source]
        source: DbError,
    },
}

/// Request/response contract of the document database.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Short label for logs.
    fn backend_name(&self) -> &'static str;

    async fn list_collection_names(&self) -> Result<Vec<String>, DbError>;

    /// Fails with `DbError::CollectionExists` if the name is taken.
    async fn create_collection(&self, name: &str) -> Result<(), DbError>;

    async fn insert_document(
        &self,
        collection: &str,
        document: &StoredDocument,
    ) -> Result<DocumentId, DbError>;

    /// Vector of the given document, or of the first document carrying a
    /// vector when `id` is `None`.
    async fn find_vector(
        &self,
        collection: &str,
        id: Option<&DocumentId>,
    ) -> Result<Option<EmbeddingVector>, DbError>;

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>, DbError>;

    async fn create_vector_index(&self, descriptor: &VectorIndexDescriptor) -> Result<(), DbError>;

    /// Top-`k` nearest documents as `{similarityScore, document}` rows,
    /// best match first.
    async fn vector_search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<serde_json::Value>, DbError>;
}

/// Returns a handle to `name`, creating the collection if it is absent.
pub async fn ensure_collection(
    db: &dyn DocumentDatabase,
    name: &str,
) -> Result<CollectionHandle, StoreError> {
    let wrap = |source: DbError| StoreError::Database {
        collection: name.to_string(),
        source,
    };

    let existing = db.list_collection_names().await.map_err(wrap)?;
    if existing.iter().any(|c| c == name) {
        info!("Collection '{name}' already exists");
        return Ok(CollectionHandle {
            name: name.to_string(),
            created: false,
        });
    }

    match db.create_collection(name).await {
        Ok(()) => {
            info!("Collection '{name}' created");
            Ok(CollectionHandle {
                name: name.to_string(),
                created: true,
            })
        }
        // Lost a race with another creator.
        Err(DbError::CollectionExists(_)) => Ok(CollectionHandle {
            name: name.to_string(),
            created: false,
        }),
        Err(e) => {
            error!("Failed to create collection '{name}': {e}");
            Err(wrap(e))
        }
    }
}

/// Stamps `text` and `vector` with the current time and appends them to `collection`.
pub async fn insert(
    db: &dyn DocumentDatabase,
    collection: &str,
    text: &str,
    vector: EmbeddingVector,
    expected_dimensions: usize,
) -> Result<DocumentId, StoreError> {
    if vector.dimensions() != expected_dimensions {
        return Err(StoreError::InvalidVector {
            expected: expected_dimensions,
            actual: vector.dimensions(),
        });
    }

    let document = StoredDocument {
        document_data: text.to_string(),
        content_vector: vector,
        created_at: Utc::now(),
    };

    match db.insert_document(collection, &document).await {
        Ok(id) => {
            info!("Document with embeddings uploaded to '{collection}': {id}");
            Ok(id)
        }
        Err(DbError::Write(message)) => {
            error!("Bulk write error uploading document to '{collection}': {message}");
            Err(StoreError::BulkWrite {
                collection: collection.to_string(),
                message,
            })
        }
        Err(e) => {
            error!("Unexpected error uploading document to '{collection}': {e}");
            Err(StoreError::Database {
                collection: collection.to_string(),
                source: e,
            })
        }
    }
}
