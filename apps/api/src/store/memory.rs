use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{DbError, DocumentDatabase, DocumentId, StoredDocument};
use crate::embedding::EmbeddingVector;
use crate::indexing::{VectorIndexDescriptor, COSINE_SIMILARITY};

#[derive(Default)]
struct MemoryCollection {
    documents: Vec<(DocumentId, StoredDocument)>,
    indexes: Vec<VectorIndexDescriptor>,
}

/// Process-local document database with exact cosine search.
///
/// Mirrors the remote engine's contract closely enough to run the whole
/// pipeline without a cluster: inserts create collections implicitly, searches
/// need a vector index, and re-creating an identical index is a no-op.
#[derive(Default)]
pub struct InMemoryDatabase {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentDatabase for InMemoryDatabase {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_collection_names(&self) -> Result<Vec<String>, DbError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<(), DbError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(DbError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), MemoryCollection::default());
        Ok(())
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: &StoredDocument,
    ) -> Result<DocumentId, DbError> {
        let id = DocumentId::new(Uuid::new_v4().simple().to_string());
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .documents
            .push((id.clone(), document.clone()));
        Ok(id)
    }

    async fn find_vector(
        &self,
        collection: &str,
        id: Option<&DocumentId>,
    ) -> Result<Option<EmbeddingVector>, DbError> {
        let collections = self.collections.read();
        let Some(c) = collections.get(collection) else {
            return Ok(None);
        };
        Ok(c.documents
            .iter()
            .filter(|(doc_id, _)| id.map_or(true, |wanted| doc_id == wanted))
            .map(|(_, doc)| &doc.content_vector)
            .find(|v| v.dimensions() > 0)
            .cloned())
    }

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>, DbError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.index_name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_vector_index(&self, descriptor: &VectorIndexDescriptor) -> Result<(), DbError> {
        if descriptor.similarity != COSINE_SIMILARITY {
            return Err(DbError::Backend(format!(
                "unsupported similarity '{}'",
                descriptor.similarity
            )));
        }

        let mut collections = self.collections.write();
        let collection = collections
            .entry(descriptor.collection_name.clone())
            .or_default();

        match collection
            .indexes
            .iter()
            .find(|i| i.index_name == descriptor.index_name)
        {
            Some(existing) if existing == descriptor => Ok(()),
            Some(existing) => Err(DbError::IndexConflict(format!(
                "index '{}' already exists with {} dimensions",
                existing.index_name, existing.dimensions
            ))),
            None => {
                collection.indexes.push(descriptor.clone());
                Ok(())
            }
        }
    }

    async fn vector_search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<Value>, DbError> {
        let collections = self.collections.read();
        let c = collections
            .get(collection)
            .ok_or_else(|| DbError::Backend(format!("ns does not exist: {collection}")))?;
        let index = c.indexes.first().ok_or_else(|| {
            DbError::Backend(format!("no vector index found on '{collection}'"))
        })?;
        if vector.dimensions() != index.dimensions {
            return Err(DbError::Backend(format!(
                "query vector has {} dimensions, index expects {}",
                vector.dimensions(),
                index.dimensions
            )));
        }

        let mut scored: Vec<(f64, &DocumentId, &StoredDocument)> = c
            .documents
            .iter()
            .filter(|(_, doc)| doc.content_vector.dimensions() == index.dimensions)
            .map(|(id, doc)| {
                (
                    cosine_similarity(vector.as_slice(), doc.content_vector.as_slice()),
                    id,
                    doc,
                )
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, id, doc)| {
                json!({
                    "similarityScore": score,
                    "document": {
                        "_id": id,
                        "document_data": doc.document_data,
                        "contentVector": doc.content_vector,
                        "created_at": doc.created_at,
                    }
                })
            })
            .collect())
    }
}

/// Cosine similarity in [-1, 1]; zero vectors score 0.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
