use serde::{Deserialize, Serialize};

/// Metadata carried alongside each chunk's content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub path: String,
    pub language: String,
    pub chunk_type: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub calls: Vec<String>,
    #[serde(default)]
    pub called_by: Vec<String>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// A chunk of code or documentation stored in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// An optional filter narrowing a [`crate::Index::query_text`] search.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub chunk_type: Option<String>,
    pub path_contains: Option<String>,
}

impl Filter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(chunk_type) = &self.chunk_type {
            if &metadata.chunk_type != chunk_type {
                return false;
            }
        }
        if let Some(needle) = &self.path_contains {
            if !metadata.path.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One hit from a search: the chunk plus its distance score (lower = closer).
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f32,
}

impl QueryResult {
    /// Converts the distance score into a 0-1 relevance figure, higher is
    /// more relevant.
    pub fn relevance(&self) -> f32 {
        1.0 / (1.0 + self.score)
    }
}
