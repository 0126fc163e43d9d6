//! Chunk, Page and Answer Storage
//!
//! Durable records for segmented documents and completed answers. The
//! traits are the contract the rest of the crate depends on; `MemoryStore`
//! is the bundled implementation.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::answer::AnswerRecord;
use crate::documents::segmenter::Segment;

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate chunk id: {0}")]
    Duplicate(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl Serialize for StoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A stored, citable window of a document's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub file_id: String,
    pub content: String,
    /// 1-based page number
    pub page: u32,
    /// Start position in the page text (chars)
    pub start_index: usize,
    /// End position in the page text (chars, exclusive)
    pub end_index: usize,
}

impl Chunk {
    /// Attach a fresh id and the owning file to a segment
    pub fn from_segment(segment: Segment, file_id: &str) -> Self {
        Self {
            id: Ulid::new().to_string(),
            file_id: file_id.to_string(),
            content: segment.content,
            page: segment.page,
            start_index: segment.start_index,
            end_index: segment.end_index,
        }
    }
}

/// Raw page text captured at extraction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub file_id: String,
    pub page_no: u32,
    pub page_content: String,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn create(&self, chunk: Chunk) -> Result<(), StoreError>;

    async fn create_many(&self, chunks: Vec<Chunk>) -> Result<(), StoreError> {
        for chunk in chunks {
            self.create(chunk).await?;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Chunk>, StoreError>;

    /// All chunks of a file, ordered by page then `start_index`
    async fn find_all_by_file(&self, file_id: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Chunks for the given ids; unknown ids are skipped
    async fn find_all_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, StoreError>;

    /// Remove every chunk of a file, returning how many were removed
    async fn delete_by_file(&self, file_id: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait PageStore: Send + Sync {
    async fn save_pages(&self, pages: Vec<Page>) -> Result<(), StoreError>;

    /// Pages of a file ordered by page number
    async fn find_pages(&self, file_id: &str) -> Result<Vec<Page>, StoreError>;

    async fn delete_pages(&self, file_id: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn save_answer(&self, record: AnswerRecord) -> Result<(), StoreError>;

    /// Answers of a chat, oldest first
    async fn answers_for_chat(&self, chat_id: &str) -> Result<Vec<AnswerRecord>, StoreError>;
}
