//! Grounded Answers
//!
//! Runs one question through retrieval, prompt assembly, streamed
//! generation, citation verification and persistence. Streamed text is
//! passed to the caller only once it cannot contain a partial citation
//! marker; the stored answer carries enriched, verified citations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::citations::{CitationProcessor, CitationStream, ResolvedCitation};
use crate::context::{build_context, build_user_prompt, HistoryTurn, SYSTEM_PROMPT};
use crate::documents::{Retriever, RetrieverError, DEFAULT_TOP_K};
use crate::store::{AnswerStore, StoreError};

/// Default token budget for retrieved context
pub const DEFAULT_CONTEXT_TOKENS: u32 = 8000;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrieverError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Serialize for AnswerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Text fragments as they arrive from the engine
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// A chunk offered to the engine as citable evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub chunk_id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub sources: Vec<SourceText>,
}

/// A language model that streams answer text
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, GenerationError>;
}

/// One question within a chat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub chat_id: String,
    pub question: String,
    /// Files selected for this question
    pub file_ids: HashSet<String>,
    pub history: Vec<HistoryTurn>,
}

/// A completed, persisted answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: String,
    pub chat_id: String,
    pub question: String,
    /// Answer text with enriched citation markers
    pub content: String,
    /// Files the answer was allowed to draw on
    pub source_file_ids: Vec<String>,
    pub citations: Vec<ResolvedCitation>,
    pub created_at: DateTime<Utc>,
}

pub struct AnswerPipeline {
    retriever: Retriever,
    engine: Arc<dyn GenerationEngine>,
    citations: CitationProcessor,
    answers: Arc<dyn AnswerStore>,
    top_k: usize,
    token_budget: u32,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Retriever,
        engine: Arc<dyn GenerationEngine>,
        citations: CitationProcessor,
        answers: Arc<dyn AnswerStore>,
    ) -> Self {
        Self {
            retriever,
            engine,
            citations,
            answers,
            top_k: DEFAULT_TOP_K,
            token_budget: DEFAULT_CONTEXT_TOKENS,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_token_budget(mut self, token_budget: u32) -> Self {
        self.token_budget = token_budget;
        self
    }

    /// Files in scope for a question (those selected now plus those earlier
    /// answers in the same chat drew on) and the conversation so far. The
    /// history is rebuilt from stored answers unless the request carries one.
    async fn load_chat(&self, request: &AnswerRequest) -> (HashSet<String>, Vec<HistoryTurn>) {
        let mut file_ids = request.file_ids.clone();
        let previous = match self.answers.answers_for_chat(&request.chat_id).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(chat_id = %request.chat_id, error = %e, "Failed to load earlier answers, using selected files only");
                Vec::new()
            }
        };

        let history = if request.history.is_empty() {
            history_from_answers(&previous)
        } else {
            request.history.clone()
        };
        for record in previous {
            file_ids.extend(record.source_file_ids);
        }
        (file_ids, history)
    }

    /// Answer a question, calling `on_delta` with each newly displayable
    /// piece of text. Nothing is stored if retrieval or generation fails.
    pub async fn answer<F>(&self, request: AnswerRequest, mut on_delta: F) -> Result<AnswerRecord, AnswerError>
    where
        F: FnMut(&str) + Send,
    {
        let (file_ids, history) = self.load_chat(&request).await;
        let results = self.retriever.query(&file_ids, &request.question, self.top_k).await?;

        let context = build_context(&results, self.token_budget);
        let sources = results.iter()
            .filter(|r| context.chunk_ids.contains(&r.chunk_id))
            .map(|r| SourceText { chunk_id: r.chunk_id.clone(), text: r.content.clone() })
            .collect();
        debug!(
            chat_id = %request.chat_id,
            retrieved = results.len(),
            included = context.chunk_ids.len(),
            tokens = context.tokens,
            "Assembled context"
        );

        let generation = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_user_prompt(&history, &request.question, &context),
            sources,
        };

        let mut fragments = self.engine.stream(generation).await?;
        let mut stream = CitationStream::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if let Some(delta) = stream.push(&fragment) {
                on_delta(delta);
            }
        }

        debug!(
            chat_id = %request.chat_id,
            shown = stream.visible().len(),
            "Generation finished"
        );
        let processed = self.citations.process(&stream.finish()).await;
        let source_file_ids: Vec<String> = file_ids.into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let record = AnswerRecord {
            id: Ulid::new().to_string(),
            chat_id: request.chat_id,
            question: request.question,
            content: processed.text,
            source_file_ids,
            citations: processed.citations,
            created_at: Utc::now(),
        };
        self.answers.save_answer(record.clone()).await?;

        info!(
            chat_id = %record.chat_id,
            answer_id = %record.id,
            citations = record.citations.len(),
            dropped = processed.dropped.len(),
            "Stored answer"
        );
        Ok(record)
    }
}

/// Alternating user and assistant turns from stored answers, oldest first
fn history_from_answers(records: &[AnswerRecord]) -> Vec<HistoryTurn> {
    records.iter()
        .flat_map(|record| {
            [
                HistoryTurn { role: "user".to_string(), content: record.question.clone() },
                HistoryTurn { role: "assistant".to_string(), content: record.content.clone() },
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexRecord, LocalIndex, VectorIndex};
    use crate::store::{Chunk, ChunkStore, MemoryStore};
    use futures::stream;
    use parking_lot::Mutex;

    /// Replays fixed fragments and records the request it was given
    struct ScriptedEngine {
        fragments: Vec<Result<String, String>>,
        seen: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedEngine {
        fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl GenerationEngine for ScriptedEngine {
        async fn stream(&self, request: GenerationRequest) -> Result<TextStream, GenerationError> {
            *self.seen.lock() = Some(request);
            let items: Vec<Result<String, GenerationError>> = self.fragments.iter()
                .map(|f| f.clone().map_err(GenerationError::Interrupted))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    async fn setup(chunks: Vec<Chunk>) -> (Arc<MemoryStore>, Retriever) {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(LocalIndex::new());
        let records = chunks.iter()
            .map(|c| IndexRecord { id: c.id.clone(), file_id: c.file_id.clone(), text: c.content.clone() })
            .collect();
        store.create_many(chunks).await.unwrap();
        index.upsert(records).await.unwrap();
        (store, Retriever::new(index))
    }

    fn chunk(id: &str, file_id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_id: file_id.to_string(),
            content: content.to_string(),
            page: 1,
            start_index: 0,
            end_index: content.chars().count(),
        }
    }

    fn request(chat_id: &str, files: &[&str]) -> AnswerRequest {
        AnswerRequest {
            chat_id: chat_id.to_string(),
            question: "How did revenue change?".to_string(),
            file_ids: files.iter().map(|f| f.to_string()).collect(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_answer_streams_and_persists() {
        let (store, retriever) = setup(vec![chunk("c1", "f1", "revenue grew ten percent")]).await;
        let engine = Arc::new(ScriptedEngine::new(&[
            "Revenue grew <citation chu",
            "nk-id=\"c1\">see</citation> and <citation chunk-id=\"ghost\">x</citation>",
            ".",
        ]));
        let pipeline = AnswerPipeline::new(
            retriever,
            engine.clone(),
            CitationProcessor::new(store.clone()),
            store.clone(),
        );

        let mut shown = String::new();
        let record = pipeline
            .answer(request("chat-1", &["f1"]), |delta| shown.push_str(delta))
            .await
            .unwrap();

        assert!(shown.starts_with("Revenue grew "));
        assert_eq!(record.citations.len(), 1);
        assert_eq!(record.citations[0].chunk_id, "c1");
        assert!(!record.content.contains("ghost"));
        assert!(record.content.contains(r#"ordinal="1""#));

        let seen = engine.seen.lock().clone().unwrap();
        assert_eq!(seen.sources.len(), 1);
        assert!(seen.prompt.contains("<chunk chunk_id=\"c1\">"));

        let stored = store.answers_for_chat("chat-1").await.unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[tokio::test]
    async fn test_failed_stream_stores_nothing() {
        let (store, retriever) = setup(vec![chunk("c1", "f1", "revenue")]).await;
        let engine = Arc::new(ScriptedEngine {
            fragments: vec![Ok("Partial".to_string()), Err("connection closed".to_string())],
            seen: Mutex::new(None),
        });
        let pipeline = AnswerPipeline::new(retriever, engine, CitationProcessor::new(store.clone()), store.clone());

        let result = pipeline.answer(request("chat-1", &["f1"]), |_| {}).await;
        assert!(matches!(result, Err(AnswerError::Generation(_))));
        assert!(store.answers_for_chat("chat-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_earlier_answer_files_stay_in_scope() {
        let (store, retriever) = setup(vec![
            chunk("c1", "f1", "revenue grew"),
            chunk("c2", "f2", "revenue fell"),
        ]).await;
        let engine = Arc::new(ScriptedEngine::new(&["ok"]));
        let pipeline = AnswerPipeline::new(retriever, engine.clone(), CitationProcessor::new(store.clone()), store.clone());

        pipeline.answer(request("chat-1", &["f1"]), |_| {}).await.unwrap();
        let second = pipeline.answer(request("chat-1", &["f2"]), |_| {}).await.unwrap();

        assert_eq!(second.source_file_ids, vec!["f1", "f2"]);
        let seen = engine.seen.lock().clone().unwrap();
        assert_eq!(seen.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_history_comes_from_stored_answers() {
        let (store, retriever) = setup(vec![chunk("c1", "f1", "revenue grew")]).await;
        let engine = Arc::new(ScriptedEngine::new(&["It grew."]));
        let pipeline = AnswerPipeline::new(retriever, engine.clone(), CitationProcessor::new(store.clone()), store.clone());

        pipeline.answer(request("chat-1", &["f1"]), |_| {}).await.unwrap();
        let mut follow_up = request("chat-1", &[]);
        follow_up.question = "By how much?".to_string();
        pipeline.answer(follow_up, |_| {}).await.unwrap();

        let seen = engine.seen.lock().clone().unwrap();
        assert!(seen.prompt.contains("user: How did revenue change?\nassistant: It grew.\n"));
        assert!(seen.prompt.contains("QUESTION: By how much?"));
    }

    #[tokio::test]
    async fn test_explicit_history_wins() {
        let (store, retriever) = setup(vec![chunk("c1", "f1", "revenue grew")]).await;
        let engine = Arc::new(ScriptedEngine::new(&["ok"]));
        let pipeline = AnswerPipeline::new(retriever, engine.clone(), CitationProcessor::new(store.clone()), store.clone());

        pipeline.answer(request("chat-1", &["f1"]), |_| {}).await.unwrap();
        let mut follow_up = request("chat-1", &["f1"]);
        follow_up.history = vec![HistoryTurn { role: "user".to_string(), content: "Earlier".to_string() }];
        pipeline.answer(follow_up, |_| {}).await.unwrap();

        let seen = engine.seen.lock().clone().unwrap();
        assert!(seen.prompt.starts_with("Conversation so far:\nuser: Earlier\n\n"));
    }

    #[tokio::test]
    async fn test_no_files_means_no_evidence() {
        let (store, retriever) = setup(vec![chunk("c1", "f1", "revenue")]).await;
        let engine = Arc::new(ScriptedEngine::new(&["I could not find that."]));
        let pipeline = AnswerPipeline::new(retriever, engine.clone(), CitationProcessor::new(store.clone()), store.clone());

        let record = pipeline.answer(request("chat-2", &[]), |_| {}).await.unwrap();
        assert!(record.citations.is_empty());
        let seen = engine.seen.lock().clone().unwrap();
        assert!(seen.sources.is_empty());
        assert!(seen.prompt.contains(crate::context::NO_EVIDENCE));
    }
}
