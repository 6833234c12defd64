//! In-memory knowledge graph with merge-on-conflict semantics

use crate::community::WeightedGraph;
use crate::{Entity, EntityType, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Entity/relationship store built during ingestion and frozen for querying.
///
/// Entities are keyed by exact name. Relationships keep discovery order and
/// are indexed by their ordered `(source, target)` pair so repeated
/// observations merge into one row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphData")]
pub struct KnowledgeGraph {
    entities: BTreeMap<String, Entity>,
    relationships: Vec<Relationship>,

    #[serde(skip)]
    pair_index: HashMap<(String, String), usize>,

    /// Undirected adjacency over every relationship endpoint
    #[serde(skip)]
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

/// Summary counts for a graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub avg_degree: f64,
}

impl KnowledgeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity or merge it into the existing one with the same name.
    ///
    /// On merge the type of the first insertion is kept; see [`Entity::merge`]
    /// for the description and provenance rules.
    pub fn add_entity(
        &mut self,
        name: impl Into<String>,
        entity_type: impl Into<EntityType>,
        description: &str,
        chunk_id: usize,
    ) {
        let name = name.into();
        match self.entities.get_mut(&name) {
            Some(existing) => existing.merge(description, chunk_id),
            None => {
                let entity = Entity::new(name.clone(), entity_type, description.trim(), chunk_id);
                self.entities.insert(name, entity);
            }
        }
    }

    /// Insert a relationship or bump the weight of the stored one.
    ///
    /// The description of a stored relationship is never updated.
    pub fn add_relationship(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        description: &str,
    ) {
        let key = (source.into(), target.into());
        if let Some(&idx) = self.pair_index.get(&key) {
            self.relationships[idx].observe();
            return;
        }

        let (source, target) = key;
        self.push_relationship(Relationship::new(source, target, description.trim()));
    }

    fn push_relationship(&mut self, relationship: Relationship) {
        let key = (relationship.source.clone(), relationship.target.clone());
        if let Some(&idx) = self.pair_index.get(&key) {
            let stored = &mut self.relationships[idx];
            stored.weight = stored.weight.saturating_add(relationship.weight);
            return;
        }

        self.adjacency
            .entry(key.0.clone())
            .or_default()
            .insert(key.1.clone());
        self.adjacency
            .entry(key.1.clone())
            .or_default()
            .insert(key.0.clone());

        self.pair_index.insert(key, self.relationships.len());
        self.relationships.push(relationship);
    }

    /// Names connected to `name` by any relationship, in either direction
    pub fn get_neighbors(&self, name: &str) -> BTreeSet<String> {
        self.adjacency.get(name).cloned().unwrap_or_default()
    }

    fn neighbors(&self, name: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(name)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Bounded breadth-first neighborhood around `names`.
    ///
    /// Names without a stored entity are still traversed and count as a hop,
    /// but they never appear in the result, and neither do relationships
    /// touching them. Every relationship in the returned graph therefore
    /// connects two entities of that graph. Weights and descriptions are
    /// copied unchanged.
    pub fn get_subgraph<S: AsRef<str>>(&self, names: &[S], depth: usize) -> KnowledgeGraph {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

        for name in names {
            let name = name.as_ref();
            if visited.insert(name) {
                queue.push_back((name, 0));
            }
        }

        while let Some((name, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for neighbor in self.neighbors(name) {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, dist + 1));
                }
            }
        }

        let mut subgraph = KnowledgeGraph::new();
        for name in visited {
            if let Some(entity) = self.entities.get(name) {
                subgraph.entities.insert(entity.name.clone(), entity.clone());
            }
        }

        for rel in &self.relationships {
            if subgraph.contains(&rel.source) && subgraph.contains(&rel.target) {
                subgraph.push_relationship(rel.clone());
            }
        }

        subgraph
    }

    /// Entity count, relationship count and average degree
    pub fn stats(&self) -> GraphStats {
        let entity_count = self.entities.len();
        let relationship_count = self.relationships.len();
        let avg_degree = if entity_count == 0 {
            0.0
        } else {
            2.0 * relationship_count as f64 / entity_count as f64
        };

        GraphStats {
            entity_count,
            relationship_count,
            avg_degree,
        }
    }

    /// Undirected weighted view used for community detection.
    ///
    /// One node per entity, in name order. Relationships between the same
    /// two entities (either direction) collapse into one edge whose weight is
    /// the sum of their weights. Relationships touching a name that is not a
    /// stored entity are left out.
    pub fn undirected_view(&self) -> WeightedGraph {
        let mut view = WeightedGraph::new();
        for name in self.entities.keys() {
            view.add_node(name);
        }
        for rel in &self.relationships {
            view.add_edge(&rel.source, &rel.target, f64::from(rel.weight));
        }
        view
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Entities in name order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Relationships in discovery order
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn relationship(&self, source: &str, target: &str) -> Option<&Relationship> {
        self.pair_index
            .get(&(source.to_string(), target.to_string()))
            .map(|&idx| &self.relationships[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Serialized shape of a graph; indexes are rebuilt on load
#[derive(Deserialize)]
struct GraphData {
    #[serde(default)]
    entities: BTreeMap<String, Entity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

impl From<GraphData> for KnowledgeGraph {
    fn from(data: GraphData) -> Self {
        let mut graph = KnowledgeGraph {
            entities: data.entities,
            ..Default::default()
        };
        for rel in data.relationships {
            graph.push_relationship(rel);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> KnowledgeGraph {
        // A - B - C - D, plus E isolated
        let mut graph = KnowledgeGraph::new();
        for (i, name) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            graph.add_entity(*name, "Concept", &format!("entity {name}"), i);
        }
        graph.add_relationship("A", "B", "a to b");
        graph.add_relationship("C", "B", "c to b");
        graph.add_relationship("C", "D", "c to d");
        graph
    }

    #[test]
    fn test_add_entity_merges_by_name() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("Steve Jobs", "Person", "Founder of Apple", 0);
        graph.add_entity("Steve Jobs", "Organization", "Founder of Pixar", 1);
        graph.add_entity("Steve Jobs", "Person", "Founder of Apple", 2);

        assert_eq!(graph.entity_count(), 1);
        let entity = graph.entity("Steve Jobs").unwrap();
        assert_eq!(entity.entity_type, EntityType::Person);
        assert_eq!(entity.description, "Founder of Apple Founder of Pixar");
        assert_eq!(entity.source_chunks, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_entity_names_are_case_sensitive() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("Apple", "Organization", "Tech company", 0);
        graph.add_entity("apple", "Concept", "Fruit", 0);
        assert_eq!(graph.entity_count(), 2);
    }

    #[test]
    fn test_add_relationship_counts_observations() {
        let mut graph = KnowledgeGraph::new();
        graph.add_relationship("Steve Jobs", "Apple Inc.", "Founded");
        graph.add_relationship("Steve Jobs", "Apple Inc.", "Was CEO of");
        graph.add_relationship("Steve Jobs", "Apple Inc.", "Left");

        assert_eq!(graph.relationship_count(), 1);
        let rel = graph.relationship("Steve Jobs", "Apple Inc.").unwrap();
        assert_eq!(rel.weight, 3);
        assert_eq!(rel.description, "Founded");
    }

    #[test]
    fn test_relationship_direction_is_kept_in_storage() {
        let mut graph = KnowledgeGraph::new();
        graph.add_relationship("A", "B", "forward");
        graph.add_relationship("B", "A", "backward");

        assert_eq!(graph.relationship_count(), 2);
        assert_eq!(graph.relationships()[0].description, "forward");
        assert_eq!(graph.relationships()[1].description, "backward");
    }

    #[test]
    fn test_neighbors_ignore_direction() {
        let graph = chain();
        assert_eq!(
            graph.get_neighbors("B"),
            BTreeSet::from(["A".to_string(), "C".to_string()])
        );
        assert_eq!(graph.get_neighbors("C").len(), 2);
        assert!(graph.get_neighbors("E").is_empty());
        assert!(graph.get_neighbors("missing").is_empty());
    }

    #[test]
    fn test_subgraph_depth_zero_keeps_seeds_only() {
        let graph = chain();
        let sub = graph.get_subgraph(&["A", "B", "D", "missing"], 0);

        let names: Vec<_> = sub.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "D"]);
        assert_eq!(sub.relationship_count(), 1);
        assert!(sub.relationship("A", "B").is_some());
    }

    #[test]
    fn test_subgraph_respects_depth() {
        let graph = chain();

        let one: Vec<_> = graph
            .get_subgraph(&["A"], 1)
            .entities()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(one, vec!["A", "B"]);

        let two: Vec<_> = graph
            .get_subgraph(&["A"], 2)
            .entities()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(two, vec!["A", "B", "C"]);

        let far = graph.get_subgraph(&["A"], 10);
        assert_eq!(far.entity_count(), 4);
        assert!(!far.contains("E"));
    }

    #[test]
    fn test_subgraph_depth_counts_from_nearest_seed() {
        // P0 - P1 - ... - P6, walked from both ends
        let mut graph = KnowledgeGraph::new();
        for i in 0..7 {
            graph.add_entity(format!("P{i}"), "Concept", "", i);
        }
        for i in 0..6 {
            graph.add_relationship(format!("P{i}"), format!("P{}", i + 1), "next");
        }

        let names = |depth| -> Vec<String> {
            graph
                .get_subgraph(&["P0", "P6"], depth)
                .entities()
                .map(|e| e.name.clone())
                .collect()
        };

        assert_eq!(names(1), vec!["P0", "P1", "P5", "P6"]);
        assert_eq!(names(2), vec!["P0", "P1", "P2", "P4", "P5", "P6"]);
        assert_eq!(names(3).len(), 7);

        let one = graph.get_subgraph(&["P0", "P6"], 1);
        assert_eq!(one.relationship_count(), 2);
        assert!(one.relationship("P0", "P1").is_some());
        assert!(one.relationship("P5", "P6").is_some());
    }

    #[test]
    fn test_subgraph_preserves_provenance_and_weight() {
        let mut graph = chain();
        graph.add_entity("A", "Concept", "extra", 9);
        graph.add_relationship("A", "B", "ignored");

        let sub = graph.get_subgraph(&["A"], 1);
        assert_eq!(
            sub.entity("A").unwrap().source_chunks,
            BTreeSet::from([0, 9])
        );
        assert_eq!(sub.relationship("A", "B").unwrap().weight, 2);
    }

    #[test]
    fn test_subgraph_drops_names_without_entity() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("Apple", "Organization", "Tech company", 0);
        graph.add_entity("Disney", "Organization", "Media company", 0);
        graph.add_relationship("Apple", "Jobs", "Founded by");
        graph.add_relationship("Jobs", "Pixar", "Founded");
        graph.add_relationship("Pixar", "Disney", "Owned by");

        // "Jobs" and "Pixar" are only relationship endpoints: they count as hops
        let sub = graph.get_subgraph(&["Apple"], 3);
        let names: Vec<_> = sub.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Disney"]);
        assert_eq!(sub.relationship_count(), 0);
    }

    #[test]
    fn test_stats_on_empty_graph() {
        let stats = KnowledgeGraph::new().stats();
        assert_eq!(stats.entity_count, 0);
        assert_eq!(stats.relationship_count, 0);
        assert_eq!(stats.avg_degree, 0.0);
    }

    #[test]
    fn test_stats_average_degree() {
        let stats = chain().stats();
        assert_eq!(stats.entity_count, 5);
        assert_eq!(stats.relationship_count, 3);
        assert!((stats.avg_degree - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_undirected_view_sums_both_directions() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("A", "Concept", "", 0);
        graph.add_entity("B", "Concept", "", 0);
        graph.add_relationship("A", "B", "");
        graph.add_relationship("A", "B", "");
        graph.add_relationship("B", "A", "");
        graph.add_relationship("A", "ghost", "");

        let view = graph.undirected_view();
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 1);
        assert_eq!(view.total_weight(), 3.0);
    }

    #[test]
    fn test_serde_rebuilds_indexes() {
        let graph = chain();
        let json = serde_json::to_string(&graph).unwrap();
        let mut back: KnowledgeGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(back.stats(), graph.stats());
        assert_eq!(back.get_neighbors("B"), graph.get_neighbors("B"));

        back.add_relationship("A", "B", "again");
        assert_eq!(back.relationship("A", "B").unwrap().weight, 2);
    }
}
