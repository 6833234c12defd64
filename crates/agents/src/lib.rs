//! Inference-backed GraphRAG pipeline
//!
//! This crate wires the core graph types to the two external services:
//! - Inference: text generation and embedding contracts plus HTTP clients
//! - Extraction: chunk → entities and relationships
//! - Summarizer: one summary per community
//! - Query: local and global retrieval
//! - GraphRag: the ingestion session tying them together

pub mod config;
pub mod error;
pub mod extraction;
pub mod graphrag;
pub mod inference;
pub mod prompts;
pub mod query;
pub mod summarizer;

pub use config::GraphRagConfig;
pub use error::{AgentError, Result};
pub use extraction::{
    parse_extraction, EntityExtractor, ExtractedEntity, ExtractedRelationship, Extraction,
};
pub use graphrag::{GraphRag, IngestReport, Snapshot};
pub use inference::{Embedder, HashEmbedder, TeiClient, TextGenerator, TgiClient};
pub use query::{GlobalContext, LocalContext, QueryEngine};
pub use summarizer::{CommunitySummaries, CommunitySummarizer};
