//! Agent error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Core error: {0}")]
    Core(#[from] graphrag_core::CoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text generation error: {0}")]
    Generation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("No graph has been built yet; call insert() first")]
    Uninitialized,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the error came from a text-generation or embedding service.
    ///
    /// Callers can retry the whole ingestion or query step on these.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            AgentError::Http(_) | AgentError::Generation(_) | AgentError::Embedding(_)
        ) || matches!(
            self,
            AgentError::Core(graphrag_core::CoreError::InvalidEmbeddingDimension { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_failures_are_distinguishable() {
        assert!(AgentError::Generation("timeout".into()).is_collaborator_failure());
        assert!(AgentError::Embedding("bad vector".into()).is_collaborator_failure());
        assert!(!AgentError::Uninitialized.is_collaborator_failure());
        assert!(!AgentError::InvalidArgument("top_k".into()).is_collaborator_failure());
    }
}
