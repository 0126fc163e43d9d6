// Sage Library
// Document segmentation, retrieval and verified citations, shared by the CLI

pub mod answer;
pub mod chroma;
pub mod citations;
pub mod config;
pub mod context;
pub mod documents;
pub mod index;
pub mod store;

pub use answer::{
    AnswerError, AnswerPipeline, AnswerRecord, AnswerRequest, GenerationEngine, GenerationError,
    GenerationRequest, SourceText, TextStream,
};
pub use citations::{
    safe_prefix, CitationProcessor, CitationStream, DroppedCitation, ProcessedAnswer,
    ResolvedCitation,
};
pub use config::{ConfigError, SageConfig};
pub use documents::{
    segment, split_form_feeds, ExtractedPage, IngestPipeline, IngestReport, RetrievalResult,
    Retriever, Reconstructor, Segment, SegmentConfig,
};
pub use index::{IndexError, LocalIndex, VectorIndex};
pub use store::{AnswerStore, Chunk, ChunkStore, MemoryStore, Page, PageStore, StoreError};
