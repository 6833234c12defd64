//! Relationship types - directed, weighted links between entities

use serde::{Deserialize, Serialize};

/// A relationship in the knowledge graph.
///
/// Stored with a direction, but neighbor lookups and the community view
/// treat it as undirected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    /// Source entity name
    pub source: String,

    /// Target entity name
    pub target: String,

    /// Description from the first observation; never updated
    #[serde(default)]
    pub description: String,

    /// Number of times this ordered pair was observed
    pub weight: u32,
}

impl Relationship {
    /// Create a relationship observed once
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            description: description.into(),
            weight: 1,
        }
    }

    /// Record another observation of the same ordered pair
    pub fn observe(&mut self) {
        self.weight = self.weight.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new("Steve Jobs", "Apple Inc.", "Founded the company");

        assert_eq!(rel.source, "Steve Jobs");
        assert_eq!(rel.target, "Apple Inc.");
        assert_eq!(rel.weight, 1);
    }
}
