//! Citations
//!
//! Marker syntax, verification against stored chunks, and truncation of
//! streamed text so partial markers are never displayed.

pub mod markers;
pub mod processor;
pub mod streaming;

pub use markers::{excerpt, find_markers, strip_malformed, CitationMarker};
pub use processor::{
    render, CitationProcessor, DropReason, DroppedCitation, ProcessedAnswer, ResolvedCitation,
    DEFAULT_EXCERPT_CHARS,
};
pub use streaming::{safe_prefix, CitationStream};
