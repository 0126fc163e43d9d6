//! Chroma-backed Vector Index
//!
//! Stores one record per chunk in a single collection, with the owning file
//! recorded in metadata. Chroma embeds the text itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::client::{ChromaClient, ChromaError, DeleteRequest, QueryRequest, QueryResponse, UpsertRequest};
use crate::index::{IndexError, IndexHit, IndexRecord, VectorIndex};

/// Default collection name
pub const COLLECTION_CHUNKS: &str = "sage-vector-index";

/// Records per upsert request
pub const DEFAULT_BATCH_SIZE: usize = 96;

/// Metadata stored with every chunk record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub file_id: String,
}

/// Build a filter restricting results to the given files
pub fn file_filter(file_ids: &[String]) -> Value {
    json!({ "file_id": { "$in": file_ids } })
}

pub struct ChromaIndex {
    client: ChromaClient,
    collection_id: String,
    batch_size: usize,
}

impl ChromaIndex {
    /// Check the server and resolve the collection. Failure here means the
    /// index is unusable and should stop startup.
    pub async fn connect(
        client: ChromaClient,
        collection: &str,
        batch_size: usize,
    ) -> Result<Self, ChromaError> {
        client.heartbeat().await?;
        let info = client.get_or_create_collection(collection).await?;
        info!(collection = %collection, id = %info.id, "Connected to Chroma collection");

        Ok(Self {
            client,
            collection_id: info.id,
            batch_size: batch_size.max(1),
        })
    }
}

/// Query for `top_k` nearest records, restricted to `file_ids` when given
pub fn query_request(query: &str, top_k: usize, file_ids: &[String]) -> QueryRequest {
    QueryRequest {
        query_texts: vec![query.to_string()],
        n_results: u32::try_from(top_k).unwrap_or(u32::MAX),
        where_filter: (!file_ids.is_empty()).then(|| file_filter(file_ids)),
        include: vec![
            "documents".to_string(),
            "metadatas".to_string(),
            "distances".to_string(),
        ],
    }
}

/// Flatten a query response into hits, dropping any record whose metadata
/// does not validate.
pub fn hits_from_response(response: QueryResponse) -> Vec<IndexHit> {
    let mut hits = Vec::new();

    for (query_idx, ids) in response.ids.iter().enumerate() {
        for (result_idx, id) in ids.iter().enumerate() {
            let metadata = response.metadatas.as_ref()
                .and_then(|m| m.get(query_idx))
                .and_then(|m| m.get(result_idx))
                .cloned()
                .flatten();

            let metadata: ChunkMetadata = match metadata.map(serde_json::from_value::<ChunkMetadata>) {
                Some(Ok(meta)) => meta,
                Some(Err(e)) => {
                    warn!(id = %id, error = %e, "Dropping hit with invalid metadata");
                    continue;
                }
                None => {
                    warn!(id = %id, "Dropping hit without metadata");
                    continue;
                }
            };

            let text = response.documents.as_ref()
                .and_then(|d| d.get(query_idx))
                .and_then(|d| d.get(result_idx))
                .cloned()
                .flatten()
                .unwrap_or_default();

            let distance = response.distances.as_ref()
                .and_then(|d| d.get(query_idx))
                .and_then(|d| d.get(result_idx))
                .copied()
                .unwrap_or(f32::MAX);

            hits.push(IndexHit {
                chunk_id: metadata.chunk_id,
                file_id: metadata.file_id,
                text,
                score: 1.0 / (1.0 + distance),
            });
        }
    }

    hits
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        for batch in records.chunks(self.batch_size) {
            let request = UpsertRequest {
                ids: batch.iter().map(|r| r.id.clone()).collect(),
                documents: batch.iter().map(|r| r.text.clone()).collect(),
                metadatas: batch.iter()
                    .map(|r| ChunkMetadata { chunk_id: r.id.clone(), file_id: r.file_id.clone() })
                    .collect(),
            };
            self.client.upsert(&self.collection_id, &request).await?;
        }
        debug!(count = records.len(), batch_size = self.batch_size, "Indexed records");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_ids: &[String],
    ) -> Result<Vec<IndexHit>, IndexError> {
        let request = query_request(query, top_k, file_ids);
        let response = self.client.query(&self.collection_id, &request).await?;
        Ok(hits_from_response(response))
    }

    async fn delete_by_file(&self, file_id: &str) -> Result<(), IndexError> {
        let request = DeleteRequest {
            ids: None,
            where_filter: Some(json!({ "file_id": { "$eq": file_id } })),
        };
        self.client.delete(&self.collection_id, &request).await?;
        Ok(())
    }
}
