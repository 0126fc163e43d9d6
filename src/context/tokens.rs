//! Token counting using tiktoken-rs.
//!
//! Uses the cl100k_base encoding. If the encoder cannot be loaded, counts
//! fall back to a character-based estimate.

use lazy_static::lazy_static;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

lazy_static! {
    static ref ENCODER: Option<CoreBPE> = match cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            warn!(error = %e, "Failed to load cl100k_base, estimating token counts");
            None
        }
    };
}

/// Count tokens in text using cl100k_base encoding
pub fn count_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => estimate_tokens_quick(text),
    }
}

/// Estimate tokens without encoding (~4 bytes per token)
pub fn estimate_tokens_quick(text: &str) -> u32 {
    (text.len() as f64 / 4.0).ceil() as u32
}
