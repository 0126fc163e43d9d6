//! Prompt assembly for grounded answers.
//!
//! Retrieved chunks are rendered as tagged blocks the generation engine can
//! cite by id. The context is capped by a token budget; chunks arrive in
//! relevance order, so the least relevant are the ones left out.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokens::count_tokens;
use crate::documents::RetrievalResult;

pub const SYSTEM_PROMPT: &str = r#"You answer questions using only the document excerpts supplied with the question.

Citing sources:
- Every excerpt is wrapped in <chunk chunk_id="ID">...</chunk>.
- Support each claim taken from an excerpt with a citation written exactly as
  <citation chunk-id="ID">short label</citation>
  where ID is copied from the chunk_id of that excerpt.
- Cite each excerpt separately. Never invent an ID and never cite an ID that was not supplied.

Answering:
- Rely on the supplied excerpts and the conversation so far, nothing else.
- If the excerpts do not contain the answer, say so plainly.
- When the sources are sufficient, answer directly without disclaimers."#;

pub const NO_EVIDENCE: &str = "No supporting evidence was found in the selected documents.";

/// A prior turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Context block and the chunk ids it includes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltContext {
    pub text: String,
    pub chunk_ids: Vec<String>,
    pub tokens: u32,
}

fn render_chunk(result: &RetrievalResult) -> String {
    format!("<chunk chunk_id=\"{}\">\n{}\n</chunk>", result.chunk_id, result.content.trim())
}

/// Render retrieved chunks until `token_budget` would be exceeded
pub fn build_context(results: &[RetrievalResult], token_budget: u32) -> BuiltContext {
    let mut blocks = Vec::new();
    let mut chunk_ids = Vec::new();
    let mut used = 0u32;

    for result in results {
        let block = render_chunk(result);
        let tokens = count_tokens(&block);
        if used + tokens > token_budget {
            debug!(
                included = chunk_ids.len(),
                omitted = results.len() - chunk_ids.len(),
                budget = token_budget,
                "Context budget reached"
            );
            break;
        }
        used += tokens;
        chunk_ids.push(result.chunk_id.clone());
        blocks.push(block);
    }

    if blocks.is_empty() {
        return BuiltContext {
            text: NO_EVIDENCE.to_string(),
            chunk_ids,
            tokens: count_tokens(NO_EVIDENCE),
        };
    }

    BuiltContext { text: blocks.join("\n\n"), chunk_ids, tokens: used }
}

/// The user turn: conversation so far, the question, then the sources
pub fn build_user_prompt(history: &[HistoryTurn], question: &str, context: &BuiltContext) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("QUESTION: {}\n\nSOURCES:\n{}", question.trim(), context.text));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, content: &str) -> RetrievalResult {
        RetrievalResult {
            chunk_id: id.to_string(),
            file_id: "f1".to_string(),
            content: content.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_chunks_are_tagged_with_ids() {
        let built = build_context(&[result("c1", "alpha"), result("c2", "beta")], 10_000);
        assert_eq!(built.chunk_ids, vec!["c1", "c2"]);
        assert!(built.text.contains("<chunk chunk_id=\"c1\">\nalpha\n</chunk>"));
        assert!(built.text.contains("<chunk chunk_id=\"c2\">"));
    }

    #[test]
    fn test_budget_drops_trailing_chunks() {
        let long = "lorem ipsum dolor ".repeat(50);
        let results = vec![result("c1", &long), result("c2", &long), result("c3", &long)];
        let one = count_tokens(&render_chunk(&results[0]));

        let built = build_context(&results, one * 2 + 1);
        assert_eq!(built.chunk_ids, vec!["c1", "c2"]);
        assert!(built.tokens <= one * 2 + 1);
    }

    #[test]
    fn test_empty_retrieval_says_no_evidence() {
        let built = build_context(&[], 1000);
        assert_eq!(built.text, NO_EVIDENCE);
        assert!(built.chunk_ids.is_empty());
    }

    #[test]
    fn test_user_prompt_includes_history() {
        let history = vec![
            HistoryTurn { role: "user".to_string(), content: "What about 2022?".to_string() },
            HistoryTurn { role: "assistant".to_string(), content: "Flat.".to_string() },
        ];
        let context = build_context(&[result("c1", "alpha")], 1000);
        let prompt = build_user_prompt(&history, " And 2023? ", &context);

        assert!(prompt.starts_with("Conversation so far:\nuser: What about 2022?\nassistant: Flat.\n"));
        assert!(prompt.contains("QUESTION: And 2023?"));
        assert!(prompt.ends_with("</chunk>"));
    }

    #[test]
    fn test_system_prompt_shows_citation_shape() {
        assert!(SYSTEM_PROMPT.contains(r#"<citation chunk-id="ID">"#));
        assert!(SYSTEM_PROMPT.contains(r#"<chunk chunk_id="ID">"#));
    }
}
