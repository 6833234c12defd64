//! Environment-driven configuration for ingestion and querying

use crate::{AgentError, Result};
use graphrag_core::LouvainConfig;

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_LOCAL_TOP_K: usize = 5;
const DEFAULT_GLOBAL_TOP_K: usize = 3;
const DEFAULT_LOCAL_DEPTH: usize = 2;
const DEFAULT_COMMUNITY_DEPTH: usize = 1;
const DEFAULT_COMMUNITY_SEED: u64 = 42;
const DEFAULT_RESOLUTION: f64 = 1.0;
const DEFAULT_EXTRACTION_CONCURRENCY: usize = 1;
const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

pub(crate) fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_positive_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_positive_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(default)
}

/// Tunables for a GraphRAG session
#[derive(Debug, Clone)]
pub struct GraphRagConfig {
    /// Chunk window in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Default number of entities selected by local search
    pub local_top_k: usize,
    /// Default number of summaries selected by global search
    pub global_top_k: usize,
    /// Hops around the selected entities in local search
    pub local_depth: usize,
    /// Hops around community members when building summary context
    pub community_depth: usize,
    /// Louvain settings
    pub louvain: LouvainConfig,
    /// Concurrent extraction requests; graph writes stay ordered
    pub extraction_concurrency: usize,
    /// Character budget for each context block put into a prompt
    pub max_context_chars: usize,
}

impl Default for GraphRagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            local_top_k: DEFAULT_LOCAL_TOP_K,
            global_top_k: DEFAULT_GLOBAL_TOP_K,
            local_depth: DEFAULT_LOCAL_DEPTH,
            community_depth: DEFAULT_COMMUNITY_DEPTH,
            louvain: LouvainConfig {
                seed: DEFAULT_COMMUNITY_SEED,
                resolution: DEFAULT_RESOLUTION,
                ..Default::default()
            },
            extraction_concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

impl GraphRagConfig {
    /// Read `GRAPHRAG_*` variables, falling back to defaults for missing or
    /// invalid values
    pub fn from_env() -> Self {
        Self {
            chunk_size: env_positive_usize("GRAPHRAG_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            chunk_overlap: env_usize("GRAPHRAG_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP),
            local_top_k: env_positive_usize("GRAPHRAG_LOCAL_TOP_K", DEFAULT_LOCAL_TOP_K),
            global_top_k: env_positive_usize("GRAPHRAG_GLOBAL_TOP_K", DEFAULT_GLOBAL_TOP_K),
            local_depth: env_usize("GRAPHRAG_LOCAL_DEPTH", DEFAULT_LOCAL_DEPTH),
            community_depth: env_usize("GRAPHRAG_COMMUNITY_DEPTH", DEFAULT_COMMUNITY_DEPTH),
            louvain: LouvainConfig {
                seed: env_u64("GRAPHRAG_COMMUNITY_SEED", DEFAULT_COMMUNITY_SEED),
                resolution: env_positive_f64("GRAPHRAG_RESOLUTION", DEFAULT_RESOLUTION),
                ..Default::default()
            },
            extraction_concurrency: env_positive_usize(
                "GRAPHRAG_EXTRACTION_CONCURRENCY",
                DEFAULT_EXTRACTION_CONCURRENCY,
            ),
            max_context_chars: env_positive_usize(
                "GRAPHRAG_MAX_CONTEXT_CHARS",
                DEFAULT_MAX_CONTEXT_CHARS,
            ),
        }
    }

    /// Builder: set chunking
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Builder: set extraction concurrency (at least 1)
    pub fn with_extraction_concurrency(mut self, concurrency: usize) -> Self {
        self.extraction_concurrency = concurrency.max(1);
        self
    }

    /// Reject settings no ingestion run could use
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AgentError::Config("chunk size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AgentError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.local_top_k == 0 || self.global_top_k == 0 {
            return Err(AgentError::Config("default top_k must be at least 1".into()));
        }
        Ok(())
    }
}
