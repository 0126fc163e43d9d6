//! Local Vector Index using Feature Hashing
//!
//! An in-process index for offline use and tests. Each token is hashed to
//! a fixed bucket, so embeddings are stable without a vocabulary: the same
//! text always produces the same vector.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

use super::{IndexError, IndexHit, IndexRecord, VectorIndex};
use crate::store::Chunk;

/// Dimensionality of the embedding vectors.
const EMBEDDING_DIM: usize = 256;

/// Embedding vector
pub type Embedding = Vec<f32>;

struct Entry {
    file_id: String,
    text: String,
    embedding: Embedding,
}

/// Feature-hash index held in memory. Honors the file filter.
#[derive(Default)]
pub struct LocalIndex {
    entries: RwLock<HashMap<String, Entry>>,
}

impl LocalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over already-stored chunks
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let index = Self::new();
        {
            let mut entries = index.entries.write();
            for chunk in chunks {
                entries.insert(chunk.id.clone(), Entry {
                    file_id: chunk.file_id.clone(),
                    text: chunk.content.clone(),
                    embedding: generate_embedding(&chunk.content),
                });
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash a token to a bucket index in `[0, EMBEDDING_DIM)`.
fn hash_token(token: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % EMBEDDING_DIM
}

/// Term-frequency vector over hashed, lowercased tokens, L2-normalized.
pub fn generate_embedding(text: &str) -> Embedding {
    let mut tf = vec![0.0f32; EMBEDDING_DIM];

    let tokens = text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty());
    for token in tokens {
        tf[hash_token(&token.to_lowercase())] += 1.0;
    }

    let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut tf {
            *x /= norm;
        }
    }
    tf
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        let count = records.len();
        let mut entries = self.entries.write();
        for record in records {
            let embedding = generate_embedding(&record.text);
            entries.insert(record.id, Entry {
                file_id: record.file_id,
                text: record.text,
                embedding,
            });
        }
        debug!(count = count, total = entries.len(), "Upserted into local index");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        file_filter: &[String],
    ) -> Result<Vec<IndexHit>, IndexError> {
        let query_embedding = generate_embedding(query);
        let entries = self.entries.read();

        let mut hits: Vec<IndexHit> = entries.iter()
            .filter(|(_, e)| file_filter.is_empty() || file_filter.contains(&e.file_id))
            .filter_map(|(id, e)| {
                let score = cosine_similarity(&query_embedding, &e.embedding);
                (score > 0.0).then(|| IndexHit {
                    chunk_id: id.clone(),
                    file_id: e.file_id.clone(),
                    text: e.text.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score.partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_file(&self, file_id: &str) -> Result<(), IndexError> {
        self.entries.write().retain(|_, e| e.file_id != file_id);
        Ok(())
    }
}
