//! Fixed-window text chunking

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// A slice of a document, the unit of extraction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Sequential id, shared across the whole corpus
    pub id: usize,
    /// Index of the source document
    pub document: usize,
    pub text: String,
}

/// Character-window chunker with overlap
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `size`
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(CoreError::Validation("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(CoreError::Validation(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Split one text into windows of `size` characters every
    /// `size - overlap` characters. The last window may be shorter.
    /// Blank text yields no window.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.size {
            return vec![text.to_string()];
        }

        let stride = self.size - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            start += stride;
        }
        windows
    }

    /// Chunk every document, numbering chunks across the corpus
    pub fn chunk_documents<S: AsRef<str>>(&self, documents: &[S]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(document, text)| {
                self.split(text.as_ref())
                    .into_iter()
                    .map(move |text| (document, text))
            })
            .enumerate()
            .map(|(id, (document, text))| Chunk { id, document, text })
            .collect()
    }
}
