//! Document Ingest
//!
//! Sequences the write path for an uploaded document: raw pages are saved,
//! pages are segmented, chunks are committed to the store, and only then
//! are they pushed to the vector index.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::segmenter::{segment_pages, ExtractedPage, PageFailure, SegmentConfig, SegmentError};
use crate::index::{IndexError, IndexRecord, VectorIndex};
use crate::store::{Chunk, ChunkStore, Page, PageStore, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid segmentation config: {0}")]
    Config(#[from] SegmentError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

impl Serialize for IngestError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub file_id: String,
    pub pages: usize,
    pub chunks: usize,
    /// Pages that produced no chunks
    pub failed_pages: Vec<PageFailure>,
}

pub struct IngestPipeline {
    chunks: Arc<dyn ChunkStore>,
    pages: Arc<dyn PageStore>,
    index: Arc<dyn VectorIndex>,
    config: SegmentConfig,
}

impl IngestPipeline {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        pages: Arc<dyn PageStore>,
        index: Arc<dyn VectorIndex>,
        config: SegmentConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { chunks, pages, index, config })
    }

    /// Ingest a document. Page-level segmentation failures are reported in
    /// the result; store and index failures are errors.
    pub async fn ingest(&self, file_id: &str, pages: Vec<ExtractedPage>) -> Result<IngestReport, IngestError> {
        let page_records: Vec<Page> = pages.iter()
            .map(|p| Page {
                file_id: file_id.to_string(),
                page_no: p.page,
                page_content: p.text.clone(),
            })
            .collect();
        if let Err(e) = self.pages.save_pages(page_records).await {
            warn!(file_id = %file_id, error = %e, "Failed to save raw pages, continuing without them");
        }

        let segmented = segment_pages(&pages, &self.config);
        let report = IngestReport {
            file_id: file_id.to_string(),
            pages: pages.len(),
            chunks: segmented.segments.len(),
            failed_pages: segmented.failures,
        };

        if segmented.segments.is_empty() {
            warn!(file_id = %file_id, "No chunks extracted from document");
            return Ok(report);
        }

        let chunks: Vec<Chunk> = segmented.segments.into_iter()
            .map(|s| Chunk::from_segment(s, file_id))
            .collect();
        let records: Vec<IndexRecord> = chunks.iter()
            .map(|c| IndexRecord {
                id: c.id.clone(),
                file_id: c.file_id.clone(),
                text: c.content.clone(),
            })
            .collect();

        self.chunks.create_many(chunks).await?;
        info!(file_id = %file_id, chunks = report.chunks, "Committed chunks");

        self.index.upsert(records).await?;
        info!(file_id = %file_id, chunks = report.chunks, "Indexed chunks");

        Ok(report)
    }

    /// Run `ingest` in the background so an upload can be acknowledged
    /// immediately. Failures are logged; the document is then simply
    /// without retrievable chunks.
    pub fn spawn(self: Arc<Self>, file_id: String, pages: Vec<ExtractedPage>) -> JoinHandle<Option<IngestReport>> {
        tokio::spawn(async move {
            match self.ingest(&file_id, pages).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(file_id = %file_id, error = %e, "Document ingest failed");
                    None
                }
            }
        })
    }

    /// Remove a document's chunks, pages and index records
    pub async fn delete_document(&self, file_id: &str) -> Result<usize, IngestError> {
        self.index.delete_by_file(file_id).await?;
        let removed = self.chunks.delete_by_file(file_id).await?;
        self.pages.delete_pages(file_id).await?;
        info!(file_id = %file_id, chunks = removed, "Deleted document");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LocalIndex;
    use crate::store::MemoryStore;

    fn pipeline(store: &Arc<MemoryStore>, index: &Arc<LocalIndex>) -> IngestPipeline {
        IngestPipeline::new(
            store.clone(),
            store.clone(),
            index.clone(),
            SegmentConfig::new(12, 4).unwrap(),
        ).unwrap()
    }

    fn pages(texts: &[(u32, &str)]) -> Vec<ExtractedPage> {
        texts.iter().map(|(page, text)| ExtractedPage { page: *page, text: text.to_string() }).collect()
    }

    #[tokio::test]
    async fn test_ingest_commits_and_indexes() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(LocalIndex::new());
        let report = pipeline(&store, &index)
            .ingest("f1", pages(&[(1, "quarterly revenue grew by ten percent"), (2, "costs fell")]))
            .await
            .unwrap();

        let stored = store.find_all_by_file("f1").await.unwrap();
        assert_eq!(report.chunks, stored.len());
        assert_eq!(index.len(), stored.len());
        assert!(report.failed_pages.is_empty());
        assert_eq!(store.find_pages("f1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bad_page_degrades_not_fails() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(LocalIndex::new());
        let report = pipeline(&store, &index)
            .ingest("f1", pages(&[(0, "misnumbered"), (2, "fine page")]))
            .await
            .unwrap();

        assert_eq!(report.failed_pages.len(), 1);
        assert_eq!(report.chunks, 1);
    }

    #[tokio::test]
    async fn test_spawned_ingest_and_cascade_delete() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(LocalIndex::new());
        let pipeline = Arc::new(pipeline(&store, &index));

        let handle = pipeline.clone().spawn("f1".to_string(), pages(&[(1, "some text to split up")]));
        let report = handle.await.unwrap().unwrap();
        assert!(report.chunks > 1);

        let removed = pipeline.delete_document("f1").await.unwrap();
        assert_eq!(removed, report.chunks);
        assert!(store.find_all_by_file("f1").await.unwrap().is_empty());
        assert!(store.find_pages("f1").await.unwrap().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        let result = IngestPipeline::new(
            store.clone(),
            store,
            Arc::new(LocalIndex::new()),
            SegmentConfig { window_size: 5, overlap: 5 },
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
