//! GraphRAG session: ingestion pipeline and query entry points

use crate::config::GraphRagConfig;
use crate::extraction::EntityExtractor;
use crate::inference::{Embedder, TextGenerator};
use crate::query::{GlobalContext, LocalContext, QueryEngine};
use crate::summarizer::{CommunitySummaries, CommunitySummarizer};
use crate::{AgentError, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use graphrag_core::{Chunker, Communities, CommunityDetector, GraphStats, KnowledgeGraph};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub document_count: usize,
    pub chunk_count: usize,
    pub stats: GraphStats,
    pub community_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything derived from one ingestion run
struct Index {
    graph: KnowledgeGraph,
    communities: Communities,
    summaries: CommunitySummaries,
    report: IngestReport,
}

/// Serializable view of a finished index
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub report: &'a IngestReport,
    pub graph: &'a KnowledgeGraph,
    pub communities: &'a Communities,
    pub summaries: &'a CommunitySummaries,
}

/// Owns the collaborators and the current index.
///
/// Each [`GraphRag::insert`] discards the previous graph, communities and
/// summaries and rebuilds them from the new corpus.
pub struct GraphRag<G, E> {
    generator: G,
    embedder: E,
    config: GraphRagConfig,
    index: Option<Index>,
}

impl<G: TextGenerator, E: Embedder> GraphRag<G, E> {
    pub fn new(generator: G, embedder: E, config: GraphRagConfig) -> Self {
        Self {
            generator,
            embedder,
            config,
            index: None,
        }
    }

    pub fn config(&self) -> &GraphRagConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Chunk, extract, partition and summarize `documents`.
    ///
    /// Extraction requests run up to `extraction_concurrency` at a time, but
    /// results are merged into the graph in chunk-id order. On error the
    /// session is left uninitialized.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn insert<S: AsRef<str>>(
        &mut self,
        documents: &[S],
        chunk_size: usize,
    ) -> Result<IngestReport> {
        self.index = None;
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        info!("Chunking {} documents (run {})", documents.len(), run_id);
        let chunker = Chunker::new(chunk_size, self.config.chunk_overlap)?;
        let chunks = chunker.chunk_documents(documents);
        info!("Created {} chunks", chunks.len());

        info!("Extracting entities and relationships");
        let extractor = EntityExtractor::new(&self.generator);
        let concurrency = self.config.extraction_concurrency.max(1);
        let mut extractions = stream::iter(chunks.iter().map(|chunk| {
            let extractor = &extractor;
            async move { (chunk.id, extractor.extract(&chunk.text).await) }
        }))
        .buffered(concurrency);

        let mut graph = KnowledgeGraph::new();
        let mut processed = 0usize;
        while let Some((chunk_id, extraction)) = extractions.next().await {
            let extraction = extraction?;
            debug!(
                "Chunk {}: {} entities, {} relationships",
                chunk_id,
                extraction.entities.len(),
                extraction.relationships.len()
            );
            extraction.apply_to(&mut graph, chunk_id);

            processed += 1;
            if processed % 10 == 0 {
                info!("Processed {}/{} chunks", processed, chunks.len());
            }
        }
        drop(extractions);

        let stats = graph.stats();
        info!(
            "Graph: {} entities, {} relationships",
            stats.entity_count, stats.relationship_count
        );

        info!("Detecting communities");
        let detector = CommunityDetector::with_config(self.config.louvain.clone());
        let communities = detector.detect_communities(&graph);
        info!("Found {} communities", communities.len());

        info!("Summarizing communities");
        let summarizer = CommunitySummarizer::new(
            &self.generator,
            self.config.community_depth,
            self.config.max_context_chars,
        );
        let summaries = summarizer.summarize_all(&graph, &communities).await?;

        let report = IngestReport {
            run_id,
            document_count: documents.len(),
            chunk_count: chunks.len(),
            stats,
            community_count: communities.len(),
            started_at,
            finished_at: Utc::now(),
        };

        info!("GraphRAG ready (run {})", run_id);
        self.index = Some(Index {
            graph,
            communities,
            summaries,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Local search with the given `top_k`
    pub async fn query_local(&self, question: &str, top_k: usize) -> Result<String> {
        self.engine()?.local_search(question, top_k).await
    }

    /// Global search with the given `top_k`
    pub async fn query_global(&self, question: &str, top_k: usize) -> Result<String> {
        self.engine()?.global_search(question, top_k).await
    }

    /// Local retrieval context, without calling the generator
    pub async fn local_context(&self, question: &str, top_k: usize) -> Result<LocalContext> {
        self.engine()?.local_context(question, top_k).await
    }

    /// Global retrieval context, without calling the generator
    pub async fn global_context(&self, question: &str, top_k: usize) -> Result<GlobalContext> {
        self.engine()?.global_context(question, top_k).await
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    pub fn graph(&self) -> Option<&KnowledgeGraph> {
        self.index.as_ref().map(|index| &index.graph)
    }

    pub fn communities(&self) -> Option<&Communities> {
        self.index.as_ref().map(|index| &index.communities)
    }

    pub fn summaries(&self) -> Option<&CommunitySummaries> {
        self.index.as_ref().map(|index| &index.summaries)
    }

    pub fn last_report(&self) -> Option<&IngestReport> {
        self.index.as_ref().map(|index| &index.report)
    }

    pub fn snapshot(&self) -> Result<Snapshot<'_>> {
        let index = self.index()?;
        Ok(Snapshot {
            report: &index.report,
            graph: &index.graph,
            communities: &index.communities,
            summaries: &index.summaries,
        })
    }

    /// Pretty-printed JSON of [`GraphRag::snapshot`]
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }

    fn index(&self) -> Result<&Index> {
        self.index.as_ref().ok_or(AgentError::Uninitialized)
    }

    fn engine(&self) -> Result<QueryEngine<'_, &G, &E>> {
        let index = self.index()?;
        Ok(QueryEngine::new(
            &index.graph,
            &index.communities,
            &index.summaries,
            &self.generator,
            &self.embedder,
        )
        .with_local_depth(self.config.local_depth)
        .with_max_context_chars(self.config.max_context_chars))
    }
}
