//! Core domain types for GraphRAG
//!
//! This crate defines the knowledge graph and the pure algorithms that run
//! over it: entity/relationship merging, bounded traversal, chunking,
//! community detection and similarity ranking. It performs no I/O.

pub mod chunk;
pub mod community;
pub mod edge;
pub mod entity;
pub mod error;
pub mod graph;
pub mod similarity;

pub use chunk::{Chunk, Chunker};
pub use community::{
    modularity, Communities, CommunityDetector, CommunityId, LouvainConfig, WeightedGraph,
};
pub use edge::Relationship;
pub use entity::{Entity, EntityType};
pub use error::{CoreError, Result};
pub use graph::{GraphStats, KnowledgeGraph};
pub use similarity::{cosine_similarity, rank_top_k, validate_dimensions};
