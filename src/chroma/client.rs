//! Chroma HTTP Client
//!
//! Direct HTTP client for Chroma's REST API. Request and response bodies
//! are explicit structs; nothing crosses the boundary as loose JSON except
//! per-record metadata, which callers validate before use.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ChromaError {
    #[error("Chroma HTTP error: {0}")]
    Http(String),
    #[error("Chroma server not available")]
    ServerUnavailable,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl Serialize for ChromaError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for ChromaError {
    fn from(e: reqwest::Error) -> Self {
        ChromaError::Http(e.to_string())
    }
}

/// Chroma collection info returned by API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertRequest<M: Serialize> {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<M>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query_texts: Vec<String>,
    pub n_results: u32,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
}

/// Result from a query operation; outer vectors are per query text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    pub documents: Option<Vec<Vec<Option<String>>>>,
    pub metadatas: Option<Vec<Vec<Option<Value>>>>,
    pub distances: Option<Vec<Vec<f32>>>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    #[serde(rename = "nanosecond heartbeat")]
    nanosecond_heartbeat: i64,
}

/// Chroma HTTP client
#[derive(Clone)]
pub struct ChromaClient {
    http: Client,
    base_url: String,
    tenant: String,
    database: String,
}

impl ChromaClient {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }

    /// Health check, returns the nanosecond heartbeat if healthy
    pub async fn heartbeat(&self) -> Result<i64, ChromaError> {
        debug!("Chroma heartbeat check");
        let resp = self.http.get(format!("{}/api/v1/heartbeat", self.base_url))
            .send().await
            .map_err(|e| {
                warn!(error = %e, "Chroma heartbeat request failed");
                ChromaError::ServerUnavailable
            })?;

        if !resp.status().is_success() {
            return Err(ChromaError::ServerUnavailable);
        }

        let body: HeartbeatResponse = resp.json().await
            .map_err(|e| ChromaError::Deserialize(e.to_string()))?;
        Ok(body.nanosecond_heartbeat)
    }

    /// Get or create a collection by name
    pub async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, ChromaError> {
        let resp = self.http.post(format!(
            "{}/api/v1/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        ))
            .json(&CreateCollectionRequest { name, get_or_create: true })
            .send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!(name = %name, status = %status, "Collection get_or_create failed");
            return Err(ChromaError::Http(format!("Create collection failed ({}): {}", status, text)));
        }

        info!(name = %name, "Collection get_or_create");
        serde_json::from_str(&text)
            .map_err(|e| ChromaError::Deserialize(format!("{}: {}", e, text)))
    }

    /// Upsert records (insert or update); Chroma computes the embeddings
    pub async fn upsert<M: Serialize + Sync>(
        &self,
        collection_id: &str,
        request: &UpsertRequest<M>,
    ) -> Result<(), ChromaError> {
        if request.ids.is_empty() {
            return Err(ChromaError::InvalidInput("ids cannot be empty".to_string()));
        }
        if request.documents.len() != request.ids.len() || request.metadatas.len() != request.ids.len() {
            return Err(ChromaError::InvalidInput(
                "ids, documents and metadatas must have equal length".to_string(),
            ));
        }

        let resp = self.http.post(format!(
            "{}/api/v1/collections/{}/upsert",
            self.base_url, collection_id
        ))
            .json(request)
            .send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(ChromaError::Http(format!("Upsert failed: {}", text)));
        }

        info!(collection = %collection_id, count = request.ids.len(), "Upserted documents");
        Ok(())
    }

    /// Query a collection by text
    pub async fn query(
        &self,
        collection_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse, ChromaError> {
        debug!(collection = %collection_id, n_results = request.n_results, "Querying collection");
        let resp = self.http.post(format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, collection_id
        ))
            .json(request)
            .send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(ChromaError::Http(format!("Query failed: {}", text)));
        }

        resp.json().await.map_err(|e| ChromaError::Deserialize(e.to_string()))
    }

    /// Delete records by IDs or filter
    pub async fn delete(&self, collection_id: &str, request: &DeleteRequest) -> Result<(), ChromaError> {
        if request.ids.is_none() && request.where_filter.is_none() {
            return Err(ChromaError::InvalidInput("delete needs ids or a filter".to_string()));
        }

        let resp = self.http.post(format!(
            "{}/api/v1/collections/{}/delete",
            self.base_url, collection_id
        ))
            .json(request)
            .send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(ChromaError::Http(format!("Delete failed: {}", text)));
        }

        info!(collection = %collection_id, "Deleted from collection");
        Ok(())
    }
}
