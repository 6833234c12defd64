//! Error types for the core domain

use thiserror::Error;

/// Core domain errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
