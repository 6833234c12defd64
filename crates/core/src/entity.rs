//! Entity types - people, organizations, places, events, concepts

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The type/classification of an entity.
///
/// Extraction output is uncontrolled, so any label outside the known set is
/// kept verbatim in `Other` instead of being rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// A person
    Person,
    /// An organization or company
    Organization,
    /// A location
    Location,
    /// An event
    Event,
    /// A concept or idea
    Concept,
    /// Any other label, as extracted
    Other(String),
}

impl EntityType {
    /// Parse an extracted label. Known categories match case-insensitively.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "person" => Self::Person,
            "organization" | "organisation" => Self::Organization,
            "location" => Self::Location,
            "event" => Self::Event,
            "concept" => Self::Concept,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Location => "Location",
            Self::Event => "Event",
            Self::Concept => "Concept",
            Self::Other(label) => label,
        }
    }
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Concept
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntityType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<&str> for EntityType {
    fn from(label: &str) -> Self {
        Self::parse(label)
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

/// An entity in the knowledge graph, identified by its exact name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Exact name as extracted (case-sensitive identity)
    pub name: String,

    /// The type of entity, fixed by the first insertion
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Accumulated description
    #[serde(default)]
    pub description: String,

    /// Chunk ids that mentioned this entity
    #[serde(default)]
    pub source_chunks: BTreeSet<usize>,
}

impl Entity {
    /// Create a new entity seen in a single chunk
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<EntityType>,
        description: impl Into<String>,
        chunk_id: usize,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: description.into(),
            source_chunks: BTreeSet::from([chunk_id]),
        }
    }

    /// Fold another observation of the same entity into this one.
    ///
    /// The chunk id is always recorded. The description is appended only when
    /// it is not already a substring of the accumulated text.
    pub fn merge(&mut self, description: &str, chunk_id: usize) {
        self.source_chunks.insert(chunk_id);

        let description = description.trim();
        if description.is_empty() || self.description.contains(description) {
            return;
        }

        if self.description.is_empty() {
            self.description = description.to_string();
        } else {
            self.description.push(' ');
            self.description.push_str(description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new("Steve Jobs", "Person", "Co-founder of Apple", 0);

        assert_eq!(entity.name, "Steve Jobs");
        assert_eq!(entity.entity_type, EntityType::Person);
        assert_eq!(entity.source_chunks, BTreeSet::from([0]));
    }

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!(EntityType::parse("organization"), EntityType::Organization);
        assert_eq!(EntityType::parse(" LOCATION "), EntityType::Location);
        assert_eq!(
            EntityType::parse("Product"),
            EntityType::Other("Product".into())
        );
        assert_eq!(EntityType::Other("Product".into()).to_string(), "Product");
    }

    #[test]
    fn test_merge_skips_known_description() {
        let mut entity = Entity::new("Pixar", "Organization", "Animation studio", 1);
        entity.merge("Animation studio", 3);
        entity.merge("Owned by Disney", 4);
        entity.merge("studio", 5);

        assert_eq!(entity.description, "Animation studio Owned by Disney");
        assert_eq!(entity.source_chunks, BTreeSet::from([1, 3, 4, 5]));
    }

    #[test]
    fn test_merge_into_empty_description() {
        let mut entity = Entity::new("Cupertino", "Location", "", 0);
        entity.merge("City in California", 1);
        assert_eq!(entity.description, "City in California");
    }

    #[test]
    fn test_entity_type_serializes_as_label() {
        let entity = Entity::new("WWDC", "Event", "Developer conference", 2);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "Event");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}
