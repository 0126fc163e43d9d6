//! Citation Processing
//!
//! Validates every marker in a finished answer against the chunk store,
//! numbers the ones that resolve, and rewrites them with display metadata.
//! Markers whose chunk cannot be confirmed are removed from the text.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::markers::{escape_attr, excerpt, find_markers, strip_malformed};
use crate::store::{Chunk, ChunkStore, StoreError};

/// Longest excerpt attached to an enriched marker, in characters
pub const DEFAULT_EXCERPT_CHARS: usize = 100;

/// A citation that was confirmed against the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCitation {
    /// 1-based, in order of first appearance
    pub ordinal: usize,
    pub chunk_id: String,
    pub file_id: String,
    pub page: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NotFound,
    LookupFailed,
}

/// A citation removed from the answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedCitation {
    pub chunk_id: String,
    pub reason: DropReason,
}

/// Answer text with verified, enriched citations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedAnswer {
    pub text: String,
    pub citations: Vec<ResolvedCitation>,
    pub dropped: Vec<DroppedCitation>,
}

pub struct CitationProcessor {
    store: Arc<dyn ChunkStore>,
    excerpt_chars: usize,
}

impl CitationProcessor {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store, excerpt_chars: DEFAULT_EXCERPT_CHARS }
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// Validate, number and enrich the citations in `text`.
    ///
    /// Every marker with a `chunk-id` is looked up, including markers that
    /// already carry enrichment attributes; those are rendered afresh from
    /// the store. Lookups run concurrently; ordinals follow first appearance
    /// in the text regardless of which lookup finishes first. A lookup error
    /// drops the citation the same way a missing chunk does. Running this on
    /// its own output returns the same text.
    pub async fn process(&self, text: &str) -> ProcessedAnswer {
        let markers = find_markers(text);

        let mut seen = HashSet::new();
        let ids: Vec<String> = markers.iter()
            .filter(|m| seen.insert(m.chunk_id.clone()))
            .map(|m| m.chunk_id.clone())
            .collect();

        let lookups = self.resolve(&ids).await;

        let mut dropped = Vec::new();
        let mut resolved: HashMap<&str, ResolvedCitation> = HashMap::new();
        let mut ordinal = 0;
        for id in &ids {
            match lookups.get(id) {
                Some(Ok(Some(chunk))) => {
                    ordinal += 1;
                    resolved.insert(id.as_str(), self.describe(chunk, ordinal));
                }
                Some(Ok(None)) | None => {
                    warn!(chunk_id = %id, "Dropping citation to unknown chunk");
                    dropped.push(DroppedCitation { chunk_id: id.clone(), reason: DropReason::NotFound });
                }
                Some(Err(e)) => {
                    warn!(chunk_id = %id, error = %e, "Dropping citation, chunk lookup failed");
                    dropped.push(DroppedCitation { chunk_id: id.clone(), reason: DropReason::LookupFailed });
                }
            }
        }

        let mut rewritten = String::with_capacity(text.len());
        let mut last = 0;
        for marker in &markers {
            rewritten.push_str(&text[last..marker.range.start]);
            if let Some(citation) = resolved.get(marker.chunk_id.as_str()) {
                rewritten.push_str(&render(citation));
            }
            last = marker.range.end;
        }
        rewritten.push_str(&text[last..]);

        let mut citations: Vec<ResolvedCitation> = resolved.into_values().collect();
        citations.sort_by_key(|c| c.ordinal);

        debug!(
            markers = markers.len(),
            resolved = citations.len(),
            dropped = dropped.len(),
            "Processed citations"
        );

        ProcessedAnswer {
            text: strip_malformed(&rewritten),
            citations,
            dropped,
        }
    }

    async fn resolve(&self, ids: &[String]) -> HashMap<String, Result<Option<Chunk>, StoreError>> {
        let mut pending: FuturesUnordered<_> = ids.iter()
            .map(|id| {
                let store = self.store.clone();
                let id = id.clone();
                async move {
                    let result = store.find_by_id(&id).await;
                    (id, result)
                }
            })
            .collect();

        let mut lookups = HashMap::with_capacity(ids.len());
        while let Some((id, result)) = pending.next().await {
            lookups.insert(id, result);
        }
        lookups
    }

    fn describe(&self, chunk: &Chunk, ordinal: usize) -> ResolvedCitation {
        ResolvedCitation {
            ordinal,
            chunk_id: chunk.id.clone(),
            file_id: chunk.file_id.clone(),
            page: chunk.page,
            start_index: chunk.start_index,
            end_index: chunk.end_index,
            excerpt: excerpt(&chunk.content, self.excerpt_chars),
        }
    }
}

/// The enriched marker for a resolved citation
pub fn render(citation: &ResolvedCitation) -> String {
    format!(
        r#"<citation chunk-id="{}" ordinal="{}" file-id="{}" page="{}" start-index="{}" end-index="{}" excerpt="{}">[{}]</citation>"#,
        escape_attr(&citation.chunk_id),
        citation.ordinal,
        escape_attr(&citation.file_id),
        citation.page,
        citation.start_index,
        citation.end_index,
        escape_attr(&citation.excerpt),
        citation.ordinal,
    )
}
