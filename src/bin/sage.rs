//! Sage CLI
//!
//! Command-line interface for ingesting documents, querying them, and
//! checking citations in generated answers. Output is JSON on stdout;
//! logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use sage_lib::chroma::{ChromaClient, ChromaIndex};
use sage_lib::{
    safe_prefix, segment, split_form_feeds, AnswerStore, CitationProcessor, IngestPipeline,
    LocalIndex, MemoryStore, Reconstructor, Retriever, SageConfig, SegmentConfig, VectorIndex,
};

#[derive(Parser)]
#[command(name = "sage")]
#[command(about = "Sage CLI - grounded answers over your documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a text file and print the chunks without storing them
    Segment {
        /// Text file; form feeds separate pages
        path: PathBuf,
        #[arg(long)]
        window: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Segment, store and index a text file
    Ingest {
        path: PathBuf,
        /// Id for the document (default: a new ULID)
        #[arg(long)]
        file_id: Option<String>,
    },
    /// Print a document's text rebuilt from its chunks
    Reconstruct {
        file_id: String,
    },
    /// Show where a cited chunk sits in its document
    Inspect {
        chunk_id: String,
    },
    /// Rank chunks of the given files against a query
    Query {
        text: String,
        /// File ids to search (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Verify and enrich the citations in an answer read from stdin
    Cite,
    /// Print the part of stdin that is safe to display mid-stream
    Truncate,
    /// List stored answers of a chat
    Answers {
        chat_id: String,
    },
    /// Delete a document's chunks, pages and index records
    Delete {
        file_id: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
struct TruncateOutput<'a> {
    visible: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOutput {
    file_id: String,
    chunks_removed: usize,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sage=info,sage_lib=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: format!("{:#}", e) };
            println!("{}", serde_json::to_string(&error).unwrap_or_else(|_| "{}".to_string()));
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<String> {
    let config = SageConfig::from_env()?;

    match command {
        Commands::Segment { path, window, overlap } => {
            let segment_config = SegmentConfig::new(
                window.unwrap_or(config.segment.window_size),
                overlap.unwrap_or(config.segment.overlap),
            )?;
            let mut segments = Vec::new();
            for page in split_form_feeds(&read_text(&path)?) {
                segments.extend(segment(&page.text, page.page, &segment_config)?);
            }
            Ok(serde_json::to_string(&segments)?)
        }

        Commands::Ingest { path, file_id } => {
            let store = open_store(&config)?;
            let index = open_index(&config, &store).await?;
            let pipeline = IngestPipeline::new(store.clone(), store, index, config.segment)?;

            let file_id = file_id.unwrap_or_else(|| Ulid::new().to_string());
            let report = pipeline.ingest(&file_id, split_form_feeds(&read_text(&path)?)).await?;
            Ok(serde_json::to_string(&report)?)
        }

        Commands::Reconstruct { file_id } => {
            let store = open_store(&config)?;
            let pages = Reconstructor::new(store.clone(), store).reconstruct_pages(&file_id).await?;
            Ok(serde_json::to_string(&pages)?)
        }

        Commands::Inspect { chunk_id } => {
            let store = open_store(&config)?;
            let view = Reconstructor::new(store.clone(), store)
                .inspect_citation(&chunk_id)
                .await?
                .with_context(|| format!("Chunk not found: {}", chunk_id))?;
            Ok(serde_json::to_string(&view)?)
        }

        Commands::Query { text, files, top_k } => {
            let store = open_store(&config)?;
            let index = open_index(&config, &store).await?;
            let file_ids: HashSet<String> = files.into_iter().collect();
            let results = Retriever::new(index)
                .query(&file_ids, &text, top_k.unwrap_or(config.top_k))
                .await?;
            Ok(serde_json::to_string(&results)?)
        }

        Commands::Cite => {
            let store = open_store(&config)?;
            let processor = CitationProcessor::new(store).with_excerpt_chars(config.excerpt_chars);
            let answer = processor.process(&read_stdin()?).await;
            Ok(serde_json::to_string(&answer)?)
        }

        Commands::Truncate => {
            let input = read_stdin()?;
            Ok(serde_json::to_string(&TruncateOutput { visible: safe_prefix(&input) })?)
        }

        Commands::Answers { chat_id } => {
            let store = open_store(&config)?;
            let answers = store.answers_for_chat(&chat_id).await?;
            Ok(serde_json::to_string(&answers)?)
        }

        Commands::Delete { file_id } => {
            let store = open_store(&config)?;
            let index = open_index(&config, &store).await?;
            let pipeline = IngestPipeline::new(store.clone(), store, index, config.segment)?;
            let chunks_removed = pipeline.delete_document(&file_id).await?;
            Ok(serde_json::to_string(&DeleteOutput { file_id, chunks_removed })?)
        }
    }
}

// ============ Helpers ============

fn open_store(config: &SageConfig) -> anyhow::Result<Arc<MemoryStore>> {
    let path = config.store_path();
    let store = MemoryStore::open(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Chroma when configured, otherwise a local index over the stored chunks.
/// An unreachable Chroma server is fatal.
async fn open_index(config: &SageConfig, store: &MemoryStore) -> anyhow::Result<Arc<dyn VectorIndex>> {
    match &config.chroma_url {
        Some(url) => {
            let index = ChromaIndex::connect(ChromaClient::new(url), &config.collection, config.index_batch_size)
                .await
                .with_context(|| format!("Chroma unavailable at {}", url))?;
            Ok(Arc::new(index))
        }
        None => {
            let index = LocalIndex::from_chunks(&store.all_chunks());
            info!(chunks = index.len(), "Using local index");
            Ok(Arc::new(index))
        }
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_stdin() -> anyhow::Result<String> {
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}
