//! Query engine: local (entity neighborhood) and global (community
//! summary) retrieval

use crate::inference::{Embedder, TextGenerator};
use crate::prompts::{
    format_summaries, global_query_prompt, local_query_prompt, render_graph, truncate_chars,
};
use crate::summarizer::CommunitySummaries;
use crate::{AgentError, Result};
use graphrag_core::{rank_top_k, validate_dimensions, Communities, CommunityId, KnowledgeGraph};
use serde::Serialize;
use tracing::{debug, instrument};

const DEFAULT_LOCAL_DEPTH: usize = 2;
const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Context assembled for a local search
#[derive(Debug, Clone, Serialize)]
pub struct LocalContext {
    /// Selected entities with their similarity, best first
    pub selected: Vec<(String, f32)>,
    /// Neighborhood of the selected entities
    pub subgraph: KnowledgeGraph,
    pub prompt: String,
}

/// Context assembled for a global search
#[derive(Debug, Clone, Serialize)]
pub struct GlobalContext {
    /// Selected communities with their similarity, best first
    pub selected: Vec<(CommunityId, f32)>,
    pub prompt: String,
}

/// Read-only view over a finished index plus the two collaborators
pub struct QueryEngine<'a, G, E> {
    graph: &'a KnowledgeGraph,
    communities: &'a Communities,
    summaries: &'a CommunitySummaries,
    generator: G,
    embedder: E,
    local_depth: usize,
    max_context_chars: usize,
}

impl<'a, G: TextGenerator, E: Embedder> QueryEngine<'a, G, E> {
    pub fn new(
        graph: &'a KnowledgeGraph,
        communities: &'a Communities,
        summaries: &'a CommunitySummaries,
        generator: G,
        embedder: E,
    ) -> Self {
        Self {
            graph,
            communities,
            summaries,
            generator,
            embedder,
            local_depth: DEFAULT_LOCAL_DEPTH,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    /// Builder: hops around the selected entities in local search
    pub fn with_local_depth(mut self, depth: usize) -> Self {
        self.local_depth = depth;
        self
    }

    /// Builder: character budget per context block
    pub fn with_max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = max_chars;
        self
    }

    /// Answer from the neighborhood of the `top_k` most similar entities
    #[instrument(skip(self, question))]
    pub async fn local_search(&self, question: &str, top_k: usize) -> Result<String> {
        let context = self.local_context(question, top_k).await?;
        self.generator.complete(&context.prompt, None).await
    }

    /// Answer from the `top_k` most similar community summaries
    #[instrument(skip(self, question))]
    pub async fn global_search(&self, question: &str, top_k: usize) -> Result<String> {
        let context = self.global_context(question, top_k).await?;
        self.generator.complete(&context.prompt, None).await
    }

    /// Rank entities and build the local prompt without calling the generator
    pub async fn local_context(&self, question: &str, top_k: usize) -> Result<LocalContext> {
        check_top_k(top_k)?;
        let query = self.embedder.embed(question).await?;

        let (names, descriptions): (Vec<String>, Vec<String>) = self
            .graph
            .entities()
            .map(|e| (e.name.clone(), e.description.clone()))
            .unzip();

        let selected = self.rank(&query, names, &descriptions, top_k).await?;
        let selected_names: Vec<&str> = selected.iter().map(|(name, _)| name.as_str()).collect();
        debug!("Local search selected {:?}", selected_names);

        let subgraph = self.graph.get_subgraph(selected_names.as_slice(), self.local_depth);
        let (entities, relationships) = render_graph(&subgraph, self.max_context_chars);
        let prompt = local_query_prompt(&entities, &relationships, question);

        Ok(LocalContext {
            selected,
            subgraph,
            prompt,
        })
    }

    /// Rank community summaries and build the global prompt without calling
    /// the generator
    pub async fn global_context(&self, question: &str, top_k: usize) -> Result<GlobalContext> {
        check_top_k(top_k)?;
        let query = self.embedder.embed(question).await?;

        let (ids, texts): (Vec<CommunityId>, Vec<String>) = self
            .summaries
            .iter()
            .map(|(&id, summary)| (id, summary.clone()))
            .unzip();

        let selected = self.rank(&query, ids, &texts, top_k).await?;
        for (id, score) in &selected {
            debug!(
                "Global search selected community {} ({} members, similarity {:.3})",
                id,
                self.communities.get(id).map(Vec::len).unwrap_or(0),
                score
            );
        }

        let blocks = format_summaries(
            selected
                .iter()
                .filter_map(|(id, _)| self.summaries.get(id).map(|s| (*id, s.as_str()))),
        );
        let prompt = global_query_prompt(&truncate_chars(&blocks, self.max_context_chars), question);

        Ok(GlobalContext { selected, prompt })
    }

    async fn rank<K: Ord + Clone>(
        &self,
        query: &[f32],
        keys: Vec<K>,
        texts: &[String],
        top_k: usize,
    ) -> Result<Vec<(K, f32)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed_batch(texts).await?;
        if vectors.len() != keys.len() {
            return Err(AgentError::Embedding(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                keys.len()
            )));
        }
        validate_dimensions(query, &vectors)?;

        let items: Vec<(K, Vec<f32>)> = keys.into_iter().zip(vectors).collect();
        Ok(rank_top_k(query, &items, top_k))
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(AgentError::InvalidArgument(
            "top_k must be at least 1".into(),
        ));
    }
    Ok(())
}
