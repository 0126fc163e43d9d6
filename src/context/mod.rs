//! Context Management Module
//!
//! Token counting and assembly of the prompt sent to the generation engine.

pub mod prompt;
pub mod tokens;

pub use prompt::{
    build_context, build_user_prompt, BuiltContext, HistoryTurn, NO_EVIDENCE, SYSTEM_PROMPT,
};
pub use tokens::{count_tokens, estimate_tokens_quick};
