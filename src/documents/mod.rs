//! Document Management Module
//!
//! Segmentation, ingest, retrieval and reconstruction of uploaded documents.

pub mod ingest;
pub mod reconstructor;
pub mod retriever;
pub mod segmenter;

// Re-export key public types
pub use ingest::{IngestError, IngestPipeline, IngestReport};
pub use reconstructor::{
    reconstruct_chunks, CitationView, PageSource, ReconstructedPage, ReconstructedSpan, Reconstructor,
};
pub use retriever::{RetrievalResult, Retriever, RetrieverError, DEFAULT_TOP_K};
pub use segmenter::{
    segment, segment_pages, split_form_feeds, ExtractedPage, PageFailure, Segment, SegmentConfig, SegmentError,
    SegmentedPages,
};
