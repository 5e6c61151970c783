use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{AuthMechanism, ClientOptions, Credential, FindOneOptions};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::{debug, info};

use super::{DbError, DocumentDatabase, DocumentId, StoredDocument, TEXT_FIELD};
use crate::embedding::EmbeddingVector;
use crate::indexing::{VectorIndexDescriptor, VECTOR_FIELD};

/// Server error codes for a collection or index that already exists in a different shape.
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// Azure Cosmos DB for MongoDB (vCore). Vector indexes and search use the
/// `cosmosSearch` extensions.
#[derive(Clone)]
pub struct CosmosMongoDatabase {
    db: Database,
}

impl CosmosMongoDatabase {
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        database_name: &str,
    ) -> Result<Self> {
        info!("Connecting to Cosmos DB (MongoDB vCore)...");

        let mut options = ClientOptions::parse(uri)
            .await
            .context("Invalid MongoDB connection string")?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.credential = Some(
            Credential::builder()
                .username(user.to_string())
                .password(password.to_string())
                .mechanism(AuthMechanism::ScramSha256)
                .build(),
        );

        let client = Client::with_options(options)?;
        let db = client.database(database_name);
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .context("MongoDB ping failed")?;

        info!("Connected to database '{database_name}'");
        Ok(Self { db })
    }
}

#[async_trait]
impl DocumentDatabase for CosmosMongoDatabase {
    fn backend_name(&self) -> &'static str {
        "cosmos"
    }

    async fn list_collection_names(&self) -> Result<Vec<String>, DbError> {
        self.db.list_collection_names(None).await.map_err(db_error)
    }

    async fn create_collection(&self, name: &str) -> Result<(), DbError> {
        self.db
            .create_collection(name, None)
            .await
            .map_err(|e| match command_code(&e) {
                Some(NAMESPACE_EXISTS) => DbError::CollectionExists(name.to_string()),
                _ => db_error(e),
            })
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: &StoredDocument,
    ) -> Result<DocumentId, DbError> {
        let record = doc! {
            TEXT_FIELD: &document.document_data,
            VECTOR_FIELD: vector_to_bson(&document.content_vector),
            "created_at": BsonDateTime::from_millis(document.created_at.timestamp_millis()),
        };

        let result = self
            .db
            .collection::<Document>(collection)
            .insert_one(record, None)
            .await
            .map_err(db_error)?;

        match result.inserted_id {
            Bson::ObjectId(oid) => Ok(DocumentId::new(oid.to_hex())),
            other => Ok(DocumentId::new(other.to_string())),
        }
    }

    async fn find_vector(
        &self,
        collection: &str,
        id: Option<&DocumentId>,
    ) -> Result<Option<EmbeddingVector>, DbError> {
        let mut filter = doc! { VECTOR_FIELD: { "$exists": true } };
        if let Some(id) = id {
            let oid = ObjectId::parse_str(id.as_str())
                .map_err(|_| DbError::InvalidId(id.to_string()))?;
            filter.insert("_id", oid);
        }
        let options = FindOneOptions::builder()
            .projection(doc! { VECTOR_FIELD: 1 })
            .build();

        let found = self
            .db
            .collection::<Document>(collection)
            .find_one(filter, options)
            .await
            .map_err(db_error)?;

        found
            .map(|d| {
                d.get(VECTOR_FIELD)
                    .and_then(vector_from_bson)
                    .ok_or_else(|| DbError::Malformed(format!("unreadable {VECTOR_FIELD}")))
            })
            .transpose()
    }

    async fn list_index_names(&self, collection: &str) -> Result<Vec<String>, DbError> {
        self.db
            .collection::<Document>(collection)
            .list_index_names()
            .await
            .map_err(db_error)
    }

    async fn create_vector_index(&self, descriptor: &VectorIndexDescriptor) -> Result<(), DbError> {
        let command = create_indexes_command(descriptor);
        let response = self
            .db
            .run_command(command, None)
            .await
            .map_err(|e| match command_code(&e) {
                Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => {
                    DbError::IndexConflict(e.to_string())
                }
                _ => db_error(e),
            })?;
        debug!(
            "createIndexes on {} responded: {response}",
            descriptor.collection_name
        );
        Ok(())
    }

    async fn vector_search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<Value>, DbError> {
        let cursor = self
            .db
            .collection::<Document>(collection)
            .aggregate(search_pipeline(vector, k), None)
            .await
            .map_err(db_error)?;

        let rows: Vec<Document> = cursor.try_collect().await.map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| Bson::Document(row).into_relaxed_extjson())
            .collect())
    }
}

fn create_indexes_command(descriptor: &VectorIndexDescriptor) -> Document {
    doc! {
        "createIndexes": &descriptor.collection_name,
        "indexes": [
            {
                "name": &descriptor.index_name,
                "key": { &descriptor.key_path: "cosmosSearch" },
                "cosmosSearchOptions": {
                    "kind": &descriptor.kind,
                    "numLists": descriptor.list_count as i32,
                    "similarity": &descriptor.similarity,
                    "dimensions": descriptor.dimensions as i32,
                }
            }
        ]
    }
}

fn search_pipeline(vector: &EmbeddingVector, k: usize) -> Vec<Document> {
    vec![
        doc! {
            "$search": {
                "cosmosSearch": {
                    "vector": vector_to_bson(vector),
                    "path": VECTOR_FIELD,
                    "k": k as i64,
                },
                "returnStoredSource": true,
            }
        },
        doc! {
            "$project": {
                "similarityScore": { "$meta": "searchScore" },
                "document": "$$ROOT",
            }
        },
    ]
}

fn vector_to_bson(vector: &EmbeddingVector) -> Bson {
    Bson::Array(vector.as_slice().iter().copied().map(Bson::Double).collect())
}

fn vector_from_bson(value: &Bson) -> Option<EmbeddingVector> {
    value
        .as_array()?
        .iter()
        .map(|item| match item {
            Bson::Double(x) => Some(*x),
            Bson::Int32(x) => Some(f64::from(*x)),
            Bson::Int64(x) => Some(*x as f64),
            _ => None,
        })
        .collect::<Option<Vec<f64>>>()
        .map(EmbeddingVector::from)
}

fn command_code(e: &MongoError) -> Option<i32> {
    match e.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn db_error(e: MongoError) -> DbError {
    match e.kind.as_ref() {
        ErrorKind::Write(_) | ErrorKind::BulkWrite(_) => DbError::Write(e.to_string()),
        _ => DbError::Backend(e.to_string()),
    }
}
