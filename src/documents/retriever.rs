//! Document Retrieval
//!
//! Ranks chunks for a query within a set of files. The vector index is
//! asked to filter by file, but results are re-checked here: some index
//! configurations ignore filters, and a chunk from a file outside the
//! requested set must never be returned.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::index::{IndexError, VectorIndex};

/// Default number of results
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),
}

impl Serialize for RetrieverError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub file_id: String,
    pub content: String,
    pub score: f32,
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Top `top_k` chunks from `file_ids` by descending similarity.
    ///
    /// An empty file set, or no matching chunk, is an empty result. Index
    /// failures are errors so callers can tell an outage from "no sources".
    pub async fn query(
        &self,
        file_ids: &HashSet<String>,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrieverError> {
        if file_ids.is_empty() || top_k == 0 {
            debug!(files = file_ids.len(), top_k = top_k, "Nothing to retrieve");
            return Ok(Vec::new());
        }

        let mut filter: Vec<String> = file_ids.iter().cloned().collect();
        filter.sort();

        // Request extra to leave room for post-filtering
        let hits = self.index.search(text, top_k.saturating_mul(2), &filter).await?;
        let fetched = hits.len();

        let mut seen = HashSet::new();
        let mut results: Vec<RetrievalResult> = hits.into_iter()
            .filter(|h| file_ids.contains(&h.file_id))
            .filter(|h| seen.insert(h.chunk_id.clone()))
            .map(|h| RetrievalResult {
                chunk_id: h.chunk_id,
                file_id: h.file_id,
                content: h.text,
                score: h.score,
            })
            .collect();

        if results.len() < fetched {
            warn!(
                fetched = fetched,
                kept = results.len(),
                "Index returned chunks outside the requested files or duplicates; dropped"
            );
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        debug!(files = file_ids.len(), results = results.len(), "Retrieved chunks");
        Ok(results)
    }
}
