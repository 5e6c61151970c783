//! Vector Index Manager: keeps a `VectorSearchIndex` on each collection.

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::store::{DbError, DocumentDatabase};

pub const VECTOR_INDEX_NAME: &str = "VectorSearchIndex";
/// Document field the index is built over.
pub const VECTOR_FIELD: &str = "contentVector";
/// Inverted-file vector index.
pub const INDEX_KIND: &str = "vector-ivf";
pub const COSINE_SIMILARITY: &str = "COS";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorIndexDescriptor {
    pub collection_name: String,
    pub index_name: String,
    pub key_path: String,
    pub kind: String,
    pub list_count: u32,
    pub similarity: String,
    pub dimensions: usize,
}

impl VectorIndexDescriptor {
    /// The single-cluster cosine index every collection carries.
    pub fn cosine(collection_name: &str, dimensions: usize) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            index_name: VECTOR_INDEX_NAME.to_string(),
            key_path: VECTOR_FIELD.to_string(),
            kind: INDEX_KIND.to_string(),
            list_count: 1,
            similarity: COSINE_SIMILARITY.to_string(),
            dimensions,
        }
    }
}

#[derive(Debug, Error)]
#[error("vector index operation failed on '{collection}': {source}")]
pub struct IndexError {
    pub collection: String,
    #[source]
    pub source: DbError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    AlreadyPresent,
    Created,
}

/// Outcome of provisioning one collection in `setup_vector_indexing`.
#[derive(Debug, Serialize)]
pub struct IndexSetupOutcome {
    pub collection: String,
    pub ok: bool,
    pub error: Option<String>,
}

pub async fn index_exists(db: &dyn DocumentDatabase, collection: &str) -> Result<bool, IndexError> {
    let names = db
        .list_index_names(collection)
        .await
        .map_err(|source| IndexError {
            collection: collection.to_string(),
            source,
        })?;
    Ok(names.iter().any(|n| n == VECTOR_INDEX_NAME))
}

/// Issues the index-creation request without checking for an existing index.
pub async fn create_index(
    db: &dyn DocumentDatabase,
    collection: &str,
    dimensions: usize,
) -> Result<(), IndexError> {
    let descriptor = VectorIndexDescriptor::cosine(collection, dimensions);
    match db.create_vector_index(&descriptor).await {
        Ok(()) => {
            info!("Vector search index created on {collection} ({dimensions} dimensions)");
            Ok(())
        }
        Err(source) => {
            error!("Failed to create vector search index on {collection}: {source}");
            Err(IndexError {
                collection: collection.to_string(),
                source,
            })
        }
    }
}

/// Creates the vector index on `collection` only if it is missing.
pub async fn ensure_index(
    db: &dyn DocumentDatabase,
    collection: &str,
    dimensions: usize,
) -> Result<IndexStatus, IndexError> {
    if index_exists(db, collection).await? {
        info!("Vector search index already exists on {collection}");
        return Ok(IndexStatus::AlreadyPresent);
    }

    info!("Vector search index not found on {collection}. Creating index.");
    create_index(db, collection, dimensions).await?;
    Ok(IndexStatus::Created)
}

/// First-time provisioning: requests the index on every collection
/// unconditionally. Identical re-creation is a no-op on the database side;
/// failures are logged per collection and never abort the others.
pub async fn setup_vector_indexing(
    db: &dyn DocumentDatabase,
    collections: &[&str],
    dimensions: usize,
) -> Vec<IndexSetupOutcome> {
    let mut outcomes = Vec::with_capacity(collections.len());
    for collection in collections {
        let result = create_index(db, collection, dimensions).await;
        outcomes.push(IndexSetupOutcome {
            collection: collection.to_string(),
            ok: result.is_ok(),
            error: result.err().map(|e| e.source.to_string()),
        });
    }
    info!("Initial indexing setup completed on {} collections", collections.len());
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryDatabase;

    const COLLECTIONS: [&str; 2] = ["applicants_resumes", "jobs_collections"];

    fn vector_index_count(names: &[String]) -> usize {
        names.iter().filter(|n| *n == VECTOR_INDEX_NAME).count()
    }

    #[test]
    fn test_descriptor_defaults() {
        let d = VectorIndexDescriptor::cosine("jobs_collections", 1536);
        assert_eq!(d.index_name, "VectorSearchIndex");
        assert_eq!(d.key_path, "contentVector");
        assert_eq!(d.kind, "vector-ivf");
        assert_eq!(d.list_count, 1);
        assert_eq!(d.similarity, "COS");
        assert_eq!(d.dimensions, 1536);
    }

    #[tokio::test]
    async fn test_index_absent_on_fresh_collection() {
        let db = InMemoryDatabase::new();
        assert!(!index_exists(&db, "applicants_resumes").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let db = InMemoryDatabase::new();

        let first = ensure_index(&db, "applicants_resumes", 8).await.unwrap();
        for _ in 0..4 {
            let again = ensure_index(&db, "applicants_resumes", 8).await.unwrap();
            assert_eq!(again, IndexStatus::AlreadyPresent);
        }

        assert_eq!(first, IndexStatus::Created);
        let names = db.list_index_names("applicants_resumes").await.unwrap();
        assert_eq!(vector_index_count(&names), 1);
    }

    #[tokio::test]
    async fn test_setup_twice_leaves_one_index_per_collection() {
        let db = InMemoryDatabase::new();

        let first = setup_vector_indexing(&db, &COLLECTIONS, 8).await;
        let second = setup_vector_indexing(&db, &COLLECTIONS, 8).await;

        assert!(first.iter().all(|o| o.ok));
        assert!(second.iter().all(|o| o.ok && o.error.is_none()));
        for collection in COLLECTIONS {
            let names = db.list_index_names(collection).await.unwrap();
            assert_eq!(vector_index_count(&names), 1, "{collection}");
        }
    }

    #[tokio::test]
    async fn test_conflicting_dimensions_reported_not_fatal() {
        let db = InMemoryDatabase::new();
        setup_vector_indexing(&db, &COLLECTIONS, 8).await;

        let outcomes = setup_vector_indexing(&db, &COLLECTIONS, 16).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.ok));
        let err = create_index(&db, "jobs_collections", 16).await.unwrap_err();
        assert!(matches!(err.source, DbError::IndexConflict(_)));
    }
}
