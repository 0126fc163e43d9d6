//! Chroma Vector Database Integration
//!
//! Typed REST client and the `VectorIndex` implementation built on it.

pub mod client;
pub mod index;

pub use client::{ChromaClient, ChromaError};
pub use index::{ChromaIndex, COLLECTION_CHUNKS, DEFAULT_BATCH_SIZE};
