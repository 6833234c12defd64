//! Prompt templates and context rendering

use graphrag_core::{Entity, KnowledgeGraph, Relationship};

const EXTRACTION_TEMPLATE: &str = r#"Extract entities and relationships from this text.

Entity Types: Person, Organization, Location, Event, Concept

For each entity provide:
- name: exact name from text
- type: one of the entity types above
- description: brief description (1-2 sentences)

For each relationship provide:
- source: entity name
- target: entity name
- description: nature of relationship (1 sentence)

Text:
{text}

Return only valid JSON in this format:
{
  "entities": [
    {"name": "Apple", "type": "Organization", "description": "Technology company"}
  ],
  "relationships": [
    {"source": "Steve Jobs", "target": "Apple", "description": "Founded the company"}
  ]
}
"#;

const COMMUNITY_SUMMARY_TEMPLATE: &str = "Analyze this community of related entities from a knowledge graph.

Entities:
{entities}

Relationships:
{relationships}

Write a summary (200-300 words) that:
1. Identifies the main theme of this community
2. Explains how entities are related
3. Highlights key insights

Summary:
";

const LOCAL_QUERY_TEMPLATE: &str = "Use this knowledge graph to answer the question.

Entities:
{entities}

Relationships:
{relationships}

Question: {question}

Answer based only on the provided information.

Answer:
";

const GLOBAL_QUERY_TEMPLATE: &str = "Use these community summaries to answer the question.

{summaries}

Question: {question}

Provide a comprehensive answer synthesizing the summaries.

Answer:
";

/// System prompt sent with extraction requests
pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract knowledge graphs from text. Reply with a single JSON object and nothing else.";

/// Prompt asking for the entities and relationships of one chunk.
///
/// The chunk is injected verbatim. The template uses `{text}` as its only
/// placeholder, so braces inside the chunk are left untouched.
pub fn extraction_prompt(text: &str) -> String {
    EXTRACTION_TEMPLATE.replacen("{text}", text, 1)
}

pub fn community_summary_prompt(entities: &str, relationships: &str) -> String {
    fill(
        COMMUNITY_SUMMARY_TEMPLATE,
        &[("entities", entities), ("relationships", relationships)],
    )
}

pub fn local_query_prompt(entities: &str, relationships: &str, question: &str) -> String {
    fill(
        LOCAL_QUERY_TEMPLATE,
        &[
            ("entities", entities),
            ("relationships", relationships),
            ("question", question),
        ],
    )
}

pub fn global_query_prompt(summaries: &str, question: &str) -> String {
    fill(
        GLOBAL_QUERY_TEMPLATE,
        &[("summaries", summaries), ("question", question)],
    )
}

/// `- name (type): description`, one line per entity
pub fn format_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> String {
    entities
        .into_iter()
        .map(|e| format!("- {} ({}): {}", e.name, e.entity_type, e.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `- source → target: description`, one line per relationship
pub fn format_relationships<'a>(
    relationships: impl IntoIterator<Item = &'a Relationship>,
) -> String {
    relationships
        .into_iter()
        .map(|r| format!("- {} → {}: {}", r.source, r.target, r.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Community {id}:\n{summary}` blocks separated by blank lines
pub fn format_summaries<'a>(summaries: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    summaries
        .into_iter()
        .map(|(id, summary)| format!("Community {}:\n{}", id, summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Rendered entity and relationship blocks of a graph, each cut to `max_chars`
pub fn render_graph(graph: &KnowledgeGraph, max_chars: usize) -> (String, String) {
    let entities = truncate_chars(&format_entities(graph.entities()), max_chars);
    let relationships = truncate_chars(&format_relationships(graph.relationships()), max_chars);
    (entities, relationships)
}

/// Cut `text` to at most `max_chars` characters, preferring a line boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => {
            let head = &text[..byte_idx];
            match head.rfind('\n') {
                Some(line_end) if line_end > 0 => head[..line_end].to_string(),
                _ => head.to_string(),
            }
        }
    }
}

// Single pass so substituted values are never rescanned for placeholders.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = after.find('}').and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (end, *value))
        });
        match hit {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
