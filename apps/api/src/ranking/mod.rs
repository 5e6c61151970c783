//! Ranking Engine: scores resumes against a job description's vector.
//!
//! Flow: look up the reference vector in the jobs collection → vector search
//! over the resumes collection → project `{similarityScore, document}` rows.
//! Similarity is computed by the database; results keep its ordering.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{DbError, DocumentDatabase, DocumentId};

pub mod shaping;

pub use shaping::{shape, ShapedResult, ShapedResults};

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("no job description with an embedding found in '{collection}'")]
    NoReferenceDocument {
        collection: String,
        job_id: Option<DocumentId>,
    },

    #[error("failed to load reference vector from '{collection}': {source}")]
    Reference {
        collection: String,
        #[source]
        source: DbError,
    },

    #[error("vector search on '{collection}' failed: {source}")]
    Search {
        collection: String,
        #[source]
        source: DbError,
    },
}

/// One search hit. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// `None` when the database row carried no numeric score.
    pub similarity_score: Option<f64>,
    /// Stored source document as returned by the search.
    pub document: Value,
}

/// Ranks up to `top_k` resumes against a job description.
///
/// `reference` selects the job document by id; `None` falls back to the
/// first job document that carries a vector.
pub async fn rank(
    db: &dyn DocumentDatabase,
    jobs_collection: &str,
    resumes_collection: &str,
    reference: Option<&DocumentId>,
    top_k: usize,
) -> Result<Vec<RankedResult>, RankingError> {
    match reference {
        Some(id) => info!("Performing vector search using job {id} from {jobs_collection}"),
        None => info!("Performing vector search using first vectored job in {jobs_collection}"),
    }

    let reference_vector = db
        .find_vector(jobs_collection, reference)
        .await
        .map_err(|source| RankingError::Reference {
            collection: jobs_collection.to_string(),
            source,
        })?
        .ok_or_else(|| RankingError::NoReferenceDocument {
            collection: jobs_collection.to_string(),
            job_id: reference.cloned(),
        })?;

    if top_k == 0 {
        return Ok(Vec::new());
    }

    let rows = db
        .vector_search(resumes_collection, &reference_vector, top_k)
        .await
        .map_err(|source| RankingError::Search {
            collection: resumes_collection.to_string(),
            source,
        })?;

    let mut results: Vec<RankedResult> = rows
        .into_iter()
        .enumerate()
        .map(|(position, row)| project(position, row))
        .collect();
    results.truncate(top_k);

    info!(
        "Vector search on {resumes_collection} returned {} results",
        results.len()
    );
    Ok(results)
}

/// Score-less rows are kept so shaping can report them as skipped.
fn project(position: usize, mut row: Value) -> RankedResult {
    let similarity_score = row.get("similarityScore").and_then(Value::as_f64);
    if similarity_score.is_none() {
        warn!("Search result {position} has no numeric similarityScore");
    }
    let document = row
        .get_mut("document")
        .map(Value::take)
        .unwrap_or(Value::Null);
    RankedResult {
        similarity_score,
        document,
    }
}
