use std::sync::Arc;

use crate::index::Index;
use crate::types::Filter;

/// Retrieval against whatever collection the [`crate::IndexRouter`]
/// currently has active.
pub struct Retrieval {
    index: Arc<dyn Index>,
}

impl Retrieval {
    pub fn new(index: Arc<dyn Index>) -> Self {
        Self { index }
    }

    pub fn search(&self, query: &str, n: usize, filter: Option<&Filter>) -> Vec<crate::types::QueryResult> {
        self.index.query_text(query, n, filter)
    }

    /// Formats up to `n` results as `[chunk_type] path - signature\ncontent`
    /// blocks joined by `"\n\n---\n\n"`, stopping before a chunk that would
    /// push the running estimate past `max_tokens` (≈4 chars/token).
    pub fn get_context_for_query(&self, query: &str, max_tokens: u32, n: usize) -> String {
        let results = self.search(query, n, None);
        let mut parts = Vec::new();
        let mut approx_tokens = 0u32;

        for result in results {
            let chunk_tokens = (result.chunk.content.len() / 4) as u32;
            if approx_tokens + chunk_tokens > max_tokens {
                break;
            }
            let mut header = format!("[{}] {}", result.chunk.metadata.chunk_type, result.chunk.metadata.path);
            if !result.chunk.metadata.signature.is_empty() {
                header.push_str(" - ");
                header.push_str(&result.chunk.metadata.signature);
            }
            parts.push(format!("{header}\n{}", result.chunk.content));
            approx_tokens += chunk_tokens;
        }

        parts.join("\n\n---\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::types::{Chunk, ChunkMetadata};

    fn chunk(id: &str, chunk_type: &str, path: &str, signature: &str, content: &str) -> Chunk {
        Chunk {
            id: id.into(),
            content: content.into(),
            metadata: ChunkMetadata {
                path: path.into(),
                chunk_type: chunk_type.into(),
                signature: signature.into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn formats_header_with_signature_and_joins_with_separator() {
        let index: Arc<dyn Index> = Arc::new(MemoryIndex::new());
        index.upsert(chunk("a", "function", "src/lib.rs", "fn add(a, b)", "fn add(a, b) { a + b }"));
        index.upsert(chunk("b", "function", "src/lib.rs", "fn sub(a, b)", "fn sub(a, b) { a - b }"));
        let retrieval = Retrieval::new(index);
        let context = retrieval.get_context_for_query("fn add(a, b) { a + b }", 8000, 5);
        assert!(context.contains("[function] src/lib.rs - fn add(a, b)"));
        assert!(context.contains("\n\n---\n\n"));
    }

    #[test]
    fn stops_once_token_budget_would_be_exceeded() {
        let index: Arc<dyn Index> = Arc::new(MemoryIndex::new());
        for i in 0..20 {
            index.upsert(chunk(&i.to_string(), "function", "f.rs", "", &"x".repeat(200)));
        }
        let retrieval = Retrieval::new(index);
        let context = retrieval.get_context_for_query("x", 40, 20);
        assert!(context.matches("---").count() < 19);
    }

    #[test]
    fn omits_signature_segment_when_absent() {
        let index: Arc<dyn Index> = Arc::new(MemoryIndex::new());
        index.upsert(chunk("a", "file", "README.md", "", "project readme"));
        let retrieval = Retrieval::new(index);
        let context = retrieval.get_context_for_query("project readme", 8000, 1);
        assert_eq!(context, "[file] README.md\nproject readme");
    }
}
