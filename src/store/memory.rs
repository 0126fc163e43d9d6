//! In-memory store with optional JSON snapshot persistence.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{AnswerStore, Chunk, ChunkStore, Page, PageStore, StoreError};
use crate::answer::AnswerRecord;

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    chunks: HashMap<String, Chunk>,
    pages: HashMap<String, Vec<Page>>,
    answers: Vec<AnswerRecord>,
}

/// Chunk, page and answer records held in memory.
///
/// When opened with a path, every mutation rewrites a JSON snapshot of the
/// whole store so the next process sees the same records.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
    /// Serializes snapshot writes so an older snapshot never lands last
    flush_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot, loading it if present
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let content = fs::read_to_string(path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            info!(
                path = %path.display(),
                chunks = state.chunks.len(),
                files = state.pages.len(),
                "Loaded store snapshot"
            );
            state
        } else {
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path.to_path_buf()),
            flush_lock: Mutex::new(()),
        })
    }

    /// Every stored chunk, ordered by file, page and position
    pub fn all_chunks(&self) -> Vec<Chunk> {
        let state = self.state.read();
        let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
        chunks.sort_by(|a, b| {
            (&a.file_id, a.page, a.start_index).cmp(&(&b.file_id, b.page, b.start_index))
        });
        chunks
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock();
        let content = {
            let state = self.state.read();
            serde_json::to_string(&*state)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(path, &content)?;
        debug!(path = %path.display(), bytes = content.len(), "Flushed store snapshot");
        Ok(())
    }
}

/// Write to a sibling temp file, then rename over the target
fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn create(&self, chunk: Chunk) -> Result<(), StoreError> {
        self.create_many(vec![chunk]).await
    }

    async fn create_many(&self, chunks: Vec<Chunk>) -> Result<(), StoreError> {
        {
            let mut state = self.state.write();
            if let Some(dup) = chunks.iter().find(|c| state.chunks.contains_key(&c.id)) {
                return Err(StoreError::Duplicate(dup.id.clone()));
            }
            for chunk in chunks {
                state.chunks.insert(chunk.id.clone(), chunk);
            }
        }
        self.flush()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        Ok(self.state.read().chunks.get(id).cloned())
    }

    async fn find_all_by_file(&self, file_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let mut chunks: Vec<Chunk> = self.state.read().chunks.values()
            .filter(|c| c.file_id == file_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| (c.page, c.start_index, c.end_index));
        Ok(chunks)
    }

    async fn find_all_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, StoreError> {
        let state = self.state.read();
        Ok(ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect())
    }

    async fn delete_by_file(&self, file_id: &str) -> Result<usize, StoreError> {
        let removed = {
            let mut state = self.state.write();
            let before = state.chunks.len();
            state.chunks.retain(|_, c| c.file_id != file_id);
            before - state.chunks.len()
        };
        self.flush()?;
        Ok(removed)
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn save_pages(&self, pages: Vec<Page>) -> Result<(), StoreError> {
        {
            let mut state = self.state.write();
            for page in pages {
                let entry = state.pages.entry(page.file_id.clone()).or_default();
                entry.retain(|p| p.page_no != page.page_no);
                entry.push(page);
                entry.sort_by_key(|p| p.page_no);
            }
        }
        self.flush()
    }

    async fn find_pages(&self, file_id: &str) -> Result<Vec<Page>, StoreError> {
        Ok(self.state.read().pages.get(file_id).cloned().unwrap_or_default())
    }

    async fn delete_pages(&self, file_id: &str) -> Result<usize, StoreError> {
        let removed = self.state.write().pages.remove(file_id).map(|p| p.len()).unwrap_or(0);
        self.flush()?;
        Ok(removed)
    }
}

#[async_trait]
impl AnswerStore for MemoryStore {
    async fn save_answer(&self, record: AnswerRecord) -> Result<(), StoreError> {
        self.state.write().answers.push(record);
        self.flush()
    }

    async fn answers_for_chat(&self, chat_id: &str) -> Result<Vec<AnswerRecord>, StoreError> {
        let mut answers: Vec<AnswerRecord> = self.state.read().answers.iter()
            .filter(|a| a.chat_id == chat_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.created_at);
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, file_id: &str, page: u32, start: usize) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_id: file_id.to_string(),
            content: format!("content of {}", id),
            page,
            start_index: start,
            end_index: start + 10,
        }
    }

    #[tokio::test]
    async fn test_find_all_by_file_is_ordered() {
        let store = MemoryStore::new();
        store.create_many(vec![
            chunk("c3", "f1", 2, 0),
            chunk("c2", "f1", 1, 5),
            chunk("c1", "f1", 1, 0),
            chunk("x1", "f2", 1, 0),
        ]).await.unwrap();

        let ids: Vec<String> = store.find_all_by_file("f1").await.unwrap()
            .into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let store = MemoryStore::new();
        store.create(chunk("c1", "f1", 1, 0)).await.unwrap();
        let err = store.create(chunk("c1", "f1", 1, 5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "c1"));
    }

    #[tokio::test]
    async fn test_find_all_by_ids_skips_unknown() {
        let store = MemoryStore::new();
        store.create(chunk("c1", "f1", 1, 0)).await.unwrap();
        let found = store.find_all_by_ids(&["c1".to_string(), "nope".to_string()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_file() {
        let store = MemoryStore::new();
        store.create_many(vec![chunk("a", "f1", 1, 0), chunk("b", "f1", 1, 5), chunk("c", "f2", 1, 0)])
            .await.unwrap();
        assert_eq!(store.delete_by_file("f1").await.unwrap(), 2);
        assert!(store.find_all_by_file("f1").await.unwrap().is_empty());
        assert_eq!(store.find_all_by_file("f2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        {
            let store = MemoryStore::open(&path).unwrap();
            store.create(chunk("c1", "f1", 1, 0)).await.unwrap();
            store.save_pages(vec![Page {
                file_id: "f1".to_string(),
                page_no: 1,
                page_content: "page one".to_string(),
            }]).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.find_by_id("c1").await.unwrap().unwrap().file_id, "f1");
        assert_eq!(reopened.find_pages("f1").await.unwrap()[0].page_content, "page one");
    }

    #[tokio::test]
    async fn test_save_pages_replaces_same_page() {
        let store = MemoryStore::new();
        let page = |no: u32, text: &str| Page {
            file_id: "f1".to_string(),
            page_no: no,
            page_content: text.to_string(),
        };
        store.save_pages(vec![page(2, "two"), page(1, "one")]).await.unwrap();
        store.save_pages(vec![page(2, "two again")]).await.unwrap();

        let pages = store.find_pages("f1").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_no, 1);
        assert_eq!(pages[1].page_content, "two again");
    }
}
