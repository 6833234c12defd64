//! Entity extraction: ask the generator for a chunk's entities and
//! relationships, then recover whatever JSON it returned

use crate::inference::TextGenerator;
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use crate::Result;
use graphrag_core::{EntityType, KnowledgeGraph};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
}

/// Extracted relationship between two named entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub description: String,
}

/// Everything recovered from one chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Merge this extraction into `graph`, attributing entities to `chunk_id`
    pub fn apply_to(&self, graph: &mut KnowledgeGraph, chunk_id: usize) {
        for entity in &self.entities {
            graph.add_entity(
                entity.name.as_str(),
                entity.entity_type.clone(),
                &entity.description,
                chunk_id,
            );
        }
        for rel in &self.relationships {
            graph.add_relationship(rel.source.as_str(), rel.target.as_str(), &rel.description);
        }
    }
}

/// Turns text chunks into [`Extraction`]s using a text generator
pub struct EntityExtractor<G> {
    generator: G,
}

impl<G: TextGenerator> EntityExtractor<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Extract entities and relationships from one chunk.
    ///
    /// Unparseable replies yield an empty extraction; a failing generator
    /// call is returned as an error.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn extract(&self, text: &str) -> Result<Extraction> {
        let prompt = extraction_prompt(text);
        let response = self
            .generator
            .complete(&prompt, Some(EXTRACTION_SYSTEM_PROMPT))
            .await?;
        Ok(parse_extraction(&response))
    }
}

type ParseStrategy = fn(&str) -> Option<Value>;

/// Tried in order; the first candidate that is a JSON object wins
const PARSE_STRATEGIES: &[(&str, ParseStrategy)] = &[
    ("raw", parse_raw),
    ("fenced", parse_fenced),
    ("balanced", parse_balanced),
];

/// Recover an [`Extraction`] from a free-text generator reply
pub fn parse_extraction(response: &str) -> Extraction {
    for (name, strategy) in PARSE_STRATEGIES {
        if let Some(value) = strategy(response) {
            debug!("Parsed extraction with {} strategy", name);
            return extraction_from_value(&value);
        }
    }

    warn!(
        "No JSON object found in extraction response ({} chars)",
        response.len()
    );
    Extraction::default()
}

fn parse_json_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

fn parse_raw(response: &str) -> Option<Value> {
    parse_json_object(response)
}

/// Contents of the first ``` block, with an optional language tag
fn parse_fenced(response: &str) -> Option<Value> {
    let start = response.find("```")?;
    let after = &response[start + 3..];
    let end = after.find("```")?;
    let block = after[..end].trim_start_matches(|c: char| c.is_ascii_alphabetic());
    parse_json_object(block)
}

fn parse_balanced(response: &str) -> Option<Value> {
    parse_json_object(first_balanced_object(response)?)
}

/// The first `{...}` span whose braces balance, ignoring braces inside
/// JSON strings
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn extraction_from_value(value: &Value) -> Extraction {
    let entities = value
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_entity_item).collect())
        .unwrap_or_default();

    let relationships = value
        .get("relationships")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_relationship_item).collect())
        .unwrap_or_default();

    Extraction {
        entities,
        relationships,
    }
}

fn parse_entity_item(item: &Value) -> Option<ExtractedEntity> {
    let obj = item.as_object()?;
    let name = obj
        .get("name")
        .or_else(|| obj.get("entity"))
        .and_then(non_empty_string)?;
    let entity_type = obj
        .get("type")
        .or_else(|| obj.get("entity_type"))
        .or_else(|| obj.get("category"))
        .and_then(non_empty_string)
        .map(EntityType::from)
        .unwrap_or_default();
    let description = obj
        .get("description")
        .and_then(value_to_string)
        .unwrap_or_default();

    Some(ExtractedEntity {
        name,
        entity_type,
        description,
    })
}

fn parse_relationship_item(item: &Value) -> Option<ExtractedRelationship> {
    let obj = item.as_object()?;
    let source = obj
        .get("source")
        .or_else(|| obj.get("from"))
        .and_then(non_empty_string)?;
    let target = obj
        .get("target")
        .or_else(|| obj.get("to"))
        .and_then(non_empty_string)?;
    let description = obj
        .get("description")
        .and_then(value_to_string)
        .unwrap_or_default();

    Some(ExtractedRelationship {
        source,
        target,
        description,
    })
}

fn non_empty_string(value: &Value) -> Option<String> {
    value_to_string(value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(arr) => arr.first().and_then(value_to_string),
        Value::Object(obj) => obj.get("name").and_then(value_to_string),
        Value::Null => None,
    }
}
