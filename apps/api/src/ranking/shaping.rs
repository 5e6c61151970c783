//! Result shaping: reduces ranked results to the text shown to recruiters.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::RankedResult;
use crate::store::TEXT_FIELD;

/// Field of the search row that holds the score.
const SCORE_FIELD: &str = "similarityScore";

#[derive(Debug, Error, PartialEq)]
pub enum ShapingError {
    #[error("ranked result {position} has no usable '{field}' field")]
    MissingField { position: usize, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedResult {
    pub similarity_score: f64,
    pub document_data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShapedResults {
    pub results: Vec<ShapedResult>,
    /// Malformed records left out of `results`.
    pub skipped: usize,
}

/// Maps each ranked result to its document text, in order. A malformed
/// record is logged and skipped; the rest of the batch is unaffected.
pub fn shape(ranked: &[RankedResult]) -> ShapedResults {
    let mut shaped = ShapedResults::default();
    for (position, result) in ranked.iter().enumerate() {
        match shape_one(position, result) {
            Ok(item) => {
                info!(
                    "Similarity score: {} , Document data: {}",
                    item.similarity_score, item.document_data
                );
                shaped.results.push(item);
            }
            Err(e) => {
                warn!("Skipping ranked result: {e}");
                shaped.skipped += 1;
            }
        }
    }
    shaped
}

fn shape_one(position: usize, result: &RankedResult) -> Result<ShapedResult, ShapingError> {
    let similarity_score = result.similarity_score.ok_or(ShapingError::MissingField {
        position,
        field: SCORE_FIELD,
    })?;
    let text = result
        .document
        .get(TEXT_FIELD)
        .and_then(|v| v.as_str())
        .ok_or(ShapingError::MissingField {
            position,
            field: TEXT_FIELD,
        })?;
    Ok(ShapedResult {
        similarity_score,
        document_data: text.to_string(),
    })
}
