//! Document Reconstruction
//!
//! Rebuilds a deduplicated view of a document from its overlapping chunks.
//! Within a page, each chunk drops the prefix it shares with the chunk
//! before it, so concatenating the emitted spans reproduces the page text.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::{Chunk, ChunkStore, PageStore, StoreError};

/// A chunk with its overlap removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedSpan {
    pub chunk_id: String,
    pub page: u32,
    pub text: String,
    /// Start of `text` in the page (chars); shifted past the overlap
    pub start_index: usize,
    /// Original end of the chunk (chars, exclusive); never shifted
    pub end_index: usize,
}

/// Where a reconstructed page's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    Chunks,
    /// Page produced no chunks; raw extracted text was used instead
    StoredPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedPage {
    pub page_no: u32,
    pub content: String,
    pub source: PageSource,
}

/// Everything needed to show a cited chunk inside its page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationView {
    pub chunk_id: String,
    pub file_id: String,
    pub page: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub chunk_content: String,
    /// Reconstructed text of the cited page, if available
    pub page_content: Option<String>,
}

/// Remove overlaps from a set of chunks.
///
/// Chunks are ordered by page and `start_index`. The first chunk of each
/// page is emitted unchanged. Every later chunk drops the characters that
/// the previous chunk already covered (`previous end - own start`); a chunk
/// left with nothing is omitted.
pub fn reconstruct_chunks(chunks: &[Chunk]) -> Vec<ReconstructedSpan> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| (c.page, c.start_index, c.end_index));

    let mut spans = Vec::with_capacity(ordered.len());
    // (page, furthest end emitted so far on that page)
    let mut covered: Option<(u32, usize)> = None;

    for chunk in ordered {
        let shared = match covered {
            Some((page, end)) if page == chunk.page => end.saturating_sub(chunk.start_index),
            _ => {
                spans.push(ReconstructedSpan {
                    chunk_id: chunk.id.clone(),
                    page: chunk.page,
                    text: chunk.content.clone(),
                    start_index: chunk.start_index,
                    end_index: chunk.end_index,
                });
                covered = Some((chunk.page, chunk.end_index));
                continue;
            }
        };

        let text = skip_chars(&chunk.content, shared);
        if text.is_empty() {
            debug!(chunk_id = %chunk.id, "Chunk fully covered by overlap, omitted");
        } else {
            spans.push(ReconstructedSpan {
                chunk_id: chunk.id.clone(),
                page: chunk.page,
                text: text.to_string(),
                start_index: chunk.start_index + shared,
                end_index: chunk.end_index,
            });
        }

        if let Some((_, end)) = covered.as_mut() {
            *end = (*end).max(chunk.end_index);
        }
    }

    spans
}

/// Concatenate the spans of one page
pub fn page_text(spans: &[ReconstructedSpan], page: u32) -> String {
    spans.iter()
        .filter(|s| s.page == page)
        .map(|s| s.text.as_str())
        .collect()
}

fn skip_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[i..],
        None => "",
    }
}

/// Reconstructs documents on demand from the chunk and page stores
pub struct Reconstructor {
    chunks: Arc<dyn ChunkStore>,
    pages: Arc<dyn PageStore>,
}

impl Reconstructor {
    pub fn new(chunks: Arc<dyn ChunkStore>, pages: Arc<dyn PageStore>) -> Self {
        Self { chunks, pages }
    }

    /// Deduplicated spans for a file. An empty result means the document
    /// has no retrievable chunks and should be shown as unavailable.
    pub async fn reconstruct(&self, file_id: &str) -> Result<Vec<ReconstructedSpan>, StoreError> {
        let chunks = self.chunks.find_all_by_file(file_id).await?;
        if chunks.is_empty() {
            info!(file_id = %file_id, "No chunks for document, nothing to reconstruct");
            return Ok(Vec::new());
        }

        let spans = reconstruct_chunks(&chunks);
        debug!(file_id = %file_id, chunks = chunks.len(), spans = spans.len(), "Reconstructed document");
        Ok(spans)
    }

    /// One entry per page, ordered by page number. Pages without chunks
    /// fall back to the stored extraction text.
    pub async fn reconstruct_pages(&self, file_id: &str) -> Result<Vec<ReconstructedPage>, StoreError> {
        let spans = self.reconstruct(file_id).await?;
        let stored = self.pages.find_pages(file_id).await?;

        let mut page_nos: Vec<u32> = spans.iter().map(|s| s.page)
            .chain(stored.iter().map(|p| p.page_no))
            .collect();
        page_nos.sort_unstable();
        page_nos.dedup();

        let pages = page_nos.into_iter()
            .map(|page_no| {
                if spans.iter().any(|s| s.page == page_no) {
                    ReconstructedPage {
                        page_no,
                        content: page_text(&spans, page_no),
                        source: PageSource::Chunks,
                    }
                } else {
                    let content = stored.iter()
                        .find(|p| p.page_no == page_no)
                        .map(|p| p.page_content.clone())
                        .unwrap_or_default();
                    ReconstructedPage { page_no, content, source: PageSource::StoredPage }
                }
            })
            .collect();

        Ok(pages)
    }

    /// Locate a cited chunk and the page text it should be highlighted in
    pub async fn inspect_citation(&self, chunk_id: &str) -> Result<Option<CitationView>, StoreError> {
        let Some(chunk) = self.chunks.find_by_id(chunk_id).await? else {
            return Ok(None);
        };

        let page_content = self.reconstruct_pages(&chunk.file_id).await?
            .into_iter()
            .find(|p| p.page_no == chunk.page)
            .map(|p| p.content);

        Ok(Some(CitationView {
            chunk_id: chunk.id,
            file_id: chunk.file_id,
            page: chunk.page,
            start_index: chunk.start_index,
            end_index: chunk.end_index,
            chunk_content: chunk.content,
            page_content,
        }))
    }
}
