//! Vector Index Contract
//!
//! The similarity search backend behind the retriever. Filtering by file id
//! is requested from the index but never trusted; see `Retriever`.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chroma::client::ChromaError;

pub use local::LocalIndex;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index backend error: {0}")]
    Backend(String),
    #[error("Index unavailable")]
    Unavailable,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Serialize for IndexError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<ChromaError> for IndexError {
    fn from(e: ChromaError) -> Self {
        match e {
            ChromaError::ServerUnavailable => IndexError::Unavailable,
            ChromaError::InvalidInput(msg) => IndexError::InvalidInput(msg),
            other => IndexError::Backend(other.to_string()),
        }
    }
}

/// A chunk as written to the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub id: String,
    pub file_id: String,
    pub text: String,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHit {
    pub chunk_id: String,
    pub file_id: String,
    pub text: String,
    /// Higher is more similar
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError>;

    /// Hits ranked by similarity. `file_filter` restricts results to those
    /// files on a best-effort basis only.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_filter: &[String],
    ) -> Result<Vec<IndexHit>, IndexError>;

    async fn delete_by_file(&self, file_id: &str) -> Result<(), IndexError>;
}
