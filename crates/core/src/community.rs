//! Louvain community detection
//!
//! Partitions the undirected weighted view of a knowledge graph into disjoint
//! communities by greedily maximizing modularity:
//!
//! Q = (1/2m) * Σij[Aij - γ(ki*kj)/(2m)] * δ(ci, cj)
//!
//! Each level runs a local moving phase (nodes visited in a seeded random
//! order, each moved to the neighboring community with the best gain) and
//! then aggregates every community into a single node. Levels repeat until
//! a local moving phase moves nothing.
//!
//! Reference: Blondel et al., "Fast unfolding of communities in large networks"

use crate::KnowledgeGraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Dense, 0-based community identifier
pub type CommunityId = usize;

/// Community id -> member entity names (sorted)
pub type Communities = BTreeMap<CommunityId, Vec<String>>;

/// Undirected weighted graph over entity names
#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    /// Keyed by (min, max) node index; self-loops have equal indices
    edges: BTreeMap<(usize, usize), f64>,
}

impl WeightedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index. Existing names keep their index.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add weight to the edge between two existing nodes.
    ///
    /// Returns false (and adds nothing) when either endpoint is unknown.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: f64) -> bool {
        let (Some(&i), Some(&j)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        *self.edges.entry((i.min(j), i.max(j))).or_default() += weight;
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Sum of edge weights (m)
    pub fn total_weight(&self) -> f64 {
        self.edges.values().sum()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Weighted degree of every node; a self-loop counts twice
    fn degrees(&self) -> Vec<f64> {
        let mut degrees = vec![0.0; self.nodes.len()];
        for (&(i, j), &w) in &self.edges {
            degrees[i] += w;
            degrees[j] += w;
        }
        degrees
    }
}

/// Louvain configuration
#[derive(Debug, Clone)]
pub struct LouvainConfig {
    /// Resolution parameter (higher = more, smaller communities)
    pub resolution: f64,
    /// Seed for the node visiting order
    pub seed: u64,
    /// Maximum number of aggregation levels
    pub max_levels: usize,
    /// Maximum local moving passes per level
    pub max_passes: usize,
    /// Minimum modularity gain for a move to count
    pub min_gain: f64,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            seed: 42,
            max_levels: 32,
            max_passes: 100,
            min_gain: 1e-10,
        }
    }
}

/// Partitions a knowledge graph into communities
#[derive(Debug, Clone, Default)]
pub struct CommunityDetector {
    config: LouvainConfig,
}

impl CommunityDetector {
    /// Create a detector with the default config (seed 42)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LouvainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LouvainConfig {
        &self.config
    }

    /// Detect communities in the graph's undirected view
    pub fn detect_communities(&self, graph: &KnowledgeGraph) -> Communities {
        self.detect(&graph.undirected_view())
    }

    /// Detect communities in a weighted view.
    ///
    /// An empty view yields no communities; a view without edge weight puts
    /// every node in its own community. Ids are numbered in order of each
    /// community's first node.
    pub fn detect(&self, view: &WeightedGraph) -> Communities {
        let n = view.node_count();
        if n == 0 {
            return Communities::new();
        }

        let membership: Vec<usize> = if view.total_weight() <= 0.0 {
            (0..n).collect()
        } else {
            self.louvain(view)
        };

        let communities = group_members(view, &membership);
        debug!(
            "Detected {} communities over {} nodes",
            communities.len(),
            n
        );
        communities
    }

    fn louvain(&self, view: &WeightedGraph) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut level = Level::from_view(view);
        // original node -> node of the current level
        let mut membership: Vec<usize> = (0..view.node_count()).collect();

        for depth in 0..self.config.max_levels {
            let (assignment, moved) = self.local_moving(&level, &mut rng);
            if !moved {
                break;
            }

            let (assignment, count) = renumber(&assignment);
            for node in membership.iter_mut() {
                *node = assignment[*node];
            }
            debug!("Louvain level {}: {} -> {} nodes", depth, level.len(), count);
            level = level.aggregate(&assignment, count);
        }

        membership
    }

    /// Move nodes between communities until no move improves modularity.
    ///
    /// Returns the community of every node and whether anything moved.
    fn local_moving<R: Rng>(&self, level: &Level, rng: &mut R) -> (Vec<usize>, bool) {
        let n = level.len();
        let degrees = level.degrees();
        let total: f64 = degrees.iter().sum();
        let resolution = self.config.resolution;

        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = degrees.clone();
        let mut moved_any = false;

        if total <= 0.0 {
            return (community, false);
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        for _ in 0..self.config.max_passes {
            let mut moved = false;

            for &node in &order {
                let current = community[node];
                let degree = degrees[node];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbor, weight) in &level.adjacency[node] {
                    *links.entry(community[neighbor]).or_default() += weight;
                }

                totals[current] -= degree;
                let gain = |c: usize, weight_in: f64| {
                    weight_in - resolution * totals[c] * degree / total
                };

                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&candidate, &weight_in) in &links {
                    let candidate_gain = gain(candidate, weight_in);
                    if candidate_gain > best_gain + self.config.min_gain {
                        best = candidate;
                        best_gain = candidate_gain;
                    }
                }
                totals[best] += degree;

                if best != current {
                    community[node] = best;
                    moved = true;
                }
            }

            if !moved {
                break;
            }
            moved_any = true;
        }

        (community, moved_any)
    }
}

/// One aggregation level of the Louvain graph
struct Level {
    /// Symmetric adjacency without self-loops
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl Level {
    fn from_view(view: &WeightedGraph) -> Self {
        let n = view.node_count();
        let mut adjacency = vec![Vec::new(); n];
        let mut self_loops = vec![0.0; n];

        for (&(i, j), &w) in &view.edges {
            if i == j {
                self_loops[i] += w;
            } else {
                adjacency[i].push((j, w));
                adjacency[j].push((i, w));
            }
        }

        Self {
            adjacency,
            self_loops,
        }
    }

    fn len(&self) -> usize {
        self.self_loops.len()
    }

    fn degrees(&self) -> Vec<f64> {
        self.adjacency
            .iter()
            .zip(&self.self_loops)
            .map(|(links, &loop_weight)| {
                links.iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * loop_weight
            })
            .collect()
    }

    /// Collapse every community into one node; internal weight becomes a self-loop
    fn aggregate(&self, assignment: &[usize], count: usize) -> Level {
        let mut self_loops = vec![0.0; count];
        let mut weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();

        for (node, links) in self.adjacency.iter().enumerate() {
            let from = assignment[node];
            self_loops[from] += self.self_loops[node];

            for &(neighbor, w) in links {
                if node > neighbor {
                    continue;
                }
                let to = assignment[neighbor];
                if from == to {
                    self_loops[from] += w;
                } else {
                    *weights.entry((from.min(to), from.max(to))).or_default() += w;
                }
            }
        }

        let mut adjacency = vec![Vec::new(); count];
        for ((i, j), w) in weights {
            adjacency[i].push((j, w));
            adjacency[j].push((i, w));
        }

        Level {
            adjacency,
            self_loops,
        }
    }
}

/// Renumber labels densely in order of first appearance
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let renumbered = labels
        .iter()
        .map(|&label| {
            let next = mapping.len();
            *mapping.entry(label).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

fn group_members(view: &WeightedGraph, membership: &[usize]) -> Communities {
    let (ids, _) = renumber(membership);
    let mut communities = Communities::new();
    for (node, id) in ids.into_iter().enumerate() {
        communities
            .entry(id)
            .or_default()
            .push(view.nodes[node].clone());
    }
    for members in communities.values_mut() {
        members.sort();
    }
    communities
}

/// Modularity of a partition over a weighted view (resolution 1.0).
///
/// Nodes missing from the partition are treated as singletons. Returns 0 for
/// a view without edge weight.
pub fn modularity(view: &WeightedGraph, communities: &Communities) -> f64 {
    let m = view.total_weight();
    if m <= 0.0 {
        return 0.0;
    }

    let mut label: Vec<usize> = (0..view.node_count())
        .map(|node| usize::MAX - node)
        .collect();
    for (&id, members) in communities {
        for name in members {
            if let Some(&idx) = view.index.get(name) {
                label[idx] = id;
            }
        }
    }

    let degrees = view.degrees();
    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut degree_sum: HashMap<usize, f64> = HashMap::new();

    for (&(i, j), &w) in &view.edges {
        if label[i] == label[j] {
            *internal.entry(label[i]).or_default() += w;
        }
    }
    for (node, degree) in degrees.into_iter().enumerate() {
        *degree_sum.entry(label[node]).or_default() += degree;
    }

    degree_sum
        .iter()
        .map(|(c, &d)| {
            let l = internal.get(c).copied().unwrap_or(0.0);
            l / m - (d / (2.0 * m)).powi(2)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(edges: &[(&str, &str)]) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for (a, b) in edges {
            graph.add_entity(*a, "Concept", "", 0);
            graph.add_entity(*b, "Concept", "", 0);
            graph.add_relationship(*a, *b, "");
        }
        graph
    }

    fn community_of(communities: &Communities, name: &str) -> CommunityId {
        communities
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == name))
            .map(|(&id, _)| id)
            .unwrap()
    }

    fn two_triangles() -> KnowledgeGraph {
        graph_with(&[
            ("A", "B"),
            ("B", "C"),
            ("A", "C"),
            ("D", "E"),
            ("E", "F"),
            ("D", "F"),
            ("C", "D"),
        ])
    }

    #[test]
    fn test_empty_graph() {
        let communities = CommunityDetector::new().detect_communities(&KnowledgeGraph::new());
        assert!(communities.is_empty());
    }

    #[test]
    fn test_single_node() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("only", "Concept", "", 0);

        let communities = CommunityDetector::new().detect_communities(&graph);
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[&0], vec!["only"]);
    }

    #[test]
    fn test_no_edges_gives_singletons() {
        let mut graph = KnowledgeGraph::new();
        for name in ["c", "a", "b"] {
            graph.add_entity(name, "Concept", "", 0);
        }

        let communities = CommunityDetector::new().detect_communities(&graph);
        assert_eq!(communities.len(), 3);
        assert_eq!(communities[&0], vec!["a"]);
        assert_eq!(communities[&1], vec!["b"]);
        assert_eq!(communities[&2], vec!["c"]);
    }

    #[test]
    fn test_two_triangles_split() {
        let graph = two_triangles();
        let communities = CommunityDetector::new().detect_communities(&graph);

        assert_eq!(communities.len(), 2);
        let left = community_of(&communities, "A");
        assert_eq!(community_of(&communities, "B"), left);
        assert_eq!(community_of(&communities, "C"), left);

        let right = community_of(&communities, "D");
        assert_ne!(left, right);
        assert_eq!(community_of(&communities, "E"), right);
        assert_eq!(community_of(&communities, "F"), right);
    }

    #[test]
    fn test_disconnected_pairs() {
        let graph = graph_with(&[
            ("Steve Jobs", "Apple Inc."),
            ("Michael Jordan", "Chicago Bulls"),
        ]);
        let communities = CommunityDetector::new().detect_communities(&graph);

        assert_eq!(communities.len(), 2);
        assert_eq!(communities[&0], vec!["Apple Inc.", "Steve Jobs"]);
        assert_eq!(communities[&1], vec!["Chicago Bulls", "Michael Jordan"]);
    }

    #[test]
    fn test_partition_is_disjoint_and_dense() {
        let mut graph = two_triangles();
        graph.add_entity("isolated", "Concept", "", 0);
        let communities = CommunityDetector::new().detect_communities(&graph);

        let ids: Vec<_> = communities.keys().copied().collect();
        assert_eq!(ids, (0..communities.len()).collect::<Vec<_>>());

        let mut all: Vec<_> = communities.values().flatten().cloned().collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len());
        assert_eq!(all.len(), graph.entity_count());
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let graph = two_triangles();
        let detector = CommunityDetector::with_config(LouvainConfig {
            seed: 7,
            ..Default::default()
        });
        assert_eq!(
            detector.detect_communities(&graph),
            detector.detect_communities(&graph)
        );
    }

    #[test]
    fn test_modularity_improves_on_singletons() {
        let graph = two_triangles();
        let view = graph.undirected_view();
        let found = CommunityDetector::new().detect(&view);

        let singletons: Communities = view
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, name)| (i, vec![name.clone()]))
            .collect();

        let q = modularity(&view, &found);
        assert!(q > modularity(&view, &singletons));
        // Two triangles joined by one edge: Q = 5/14
        assert!((q - 5.0 / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_self_loops_are_tolerated() {
        let mut graph = graph_with(&[("A", "B")]);
        graph.add_relationship("A", "A", "");
        let communities = CommunityDetector::new().detect_communities(&graph);

        let members: usize = communities.values().map(Vec::len).sum();
        assert_eq!(members, 2);
    }
}
