//! Community summarizer

use crate::inference::TextGenerator;
use crate::prompts::{community_summary_prompt, render_graph};
use crate::Result;
use graphrag_core::{Communities, CommunityId, KnowledgeGraph};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Summaries keyed by community id
pub type CommunitySummaries = BTreeMap<CommunityId, String>;

/// Writes a natural-language summary for each community
pub struct CommunitySummarizer<G> {
    generator: G,
    depth: usize,
    max_context_chars: usize,
}

impl<G: TextGenerator> CommunitySummarizer<G> {
    /// `depth` is the neighborhood around the members included as context
    pub fn new(generator: G, depth: usize, max_context_chars: usize) -> Self {
        Self {
            generator,
            depth,
            max_context_chars,
        }
    }

    /// Summarize an already extracted community subgraph
    pub async fn summarize_community(&self, community_graph: &KnowledgeGraph) -> Result<String> {
        let (entities, relationships) = render_graph(community_graph, self.max_context_chars);
        let prompt = community_summary_prompt(&entities, &relationships);
        self.generator.complete(&prompt, None).await
    }

    /// Summarize every community of `graph`, in id order
    #[instrument(skip_all, fields(communities = communities.len()))]
    pub async fn summarize_all(
        &self,
        graph: &KnowledgeGraph,
        communities: &Communities,
    ) -> Result<CommunitySummaries> {
        let mut summaries = CommunitySummaries::new();

        for (&id, members) in communities {
            let subgraph = graph.get_subgraph(members.as_slice(), self.depth);
            debug!(
                "Summarizing community {} ({} members, {} entities in context)",
                id,
                members.len(),
                subgraph.entity_count()
            );
            let summary = self.summarize_community(&subgraph).await?;
            summaries.insert(id, summary);
        }

        info!("Summarized {} communities", summaries.len());
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    impl TextGenerator for Recorder {
        async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            Ok(format!("summary #{}", prompts.len()))
        }
    }

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("Apple Inc.", "Organization", "Technology company", 0);
        graph.add_entity("Steve Jobs", "Person", "Co-founder", 0);
        graph.add_entity("Chicago Bulls", "Organization", "Basketball team", 1);
        graph.add_relationship("Steve Jobs", "Apple Inc.", "Founded");
        graph
    }

    #[tokio::test]
    async fn test_summary_prompt_contains_rendered_context() {
        let recorder = Recorder::default();
        let summarizer = CommunitySummarizer::new(&recorder, 1, 1000);
        let graph = sample_graph();
        let subgraph = graph.get_subgraph(&["Steve Jobs"], 1);

        let summary = summarizer.summarize_community(&subgraph).await.unwrap();
        assert_eq!(summary, "summary #1");

        let prompts = recorder.prompts.lock().unwrap();
        assert!(prompts[0].contains("- Apple Inc. (Organization): Technology company"));
        assert!(prompts[0].contains("- Steve Jobs → Apple Inc.: Founded"));
        assert!(!prompts[0].contains("Chicago Bulls"));
    }

    #[tokio::test]
    async fn test_summarize_all_in_id_order() {
        let recorder = Recorder::default();
        let summarizer = CommunitySummarizer::new(&recorder, 1, 1000);
        let graph = sample_graph();

        let mut communities = Communities::new();
        communities.insert(0, vec!["Apple Inc.".into(), "Steve Jobs".into()]);
        communities.insert(1, vec!["Chicago Bulls".into()]);

        let summaries = summarizer.summarize_all(&graph, &communities).await.unwrap();
        assert_eq!(summaries[&0], "summary #1");
        assert_eq!(summaries[&1], "summary #2");

        let prompts = recorder.prompts.lock().unwrap();
        assert!(prompts[1].contains("- Chicago Bulls (Organization): Basketball team"));
    }

    #[tokio::test]
    async fn test_no_communities_no_calls() {
        let recorder = Recorder::default();
        let summarizer = CommunitySummarizer::new(&recorder, 1, 1000);
        let summaries = summarizer
            .summarize_all(&KnowledgeGraph::new(), &Communities::new())
            .await
            .unwrap();
        assert!(summaries.is_empty());
        assert!(recorder.prompts.lock().unwrap().is_empty());
    }
}
