use std::collections::HashMap;
use std::sync::Mutex;

use crate::embedding::{embed, l2_distance};
use crate::types::{Chunk, ChunkMetadata, Filter, QueryResult};

/// The embedding/vector search engine, treated as a black box. Callers
/// never see vectors directly except through [`Self::get_all_embeddings`]
/// (used for the 2D projection in `rag.embeddings`).
pub trait Index: Send + Sync {
    fn upsert(&self, chunk: Chunk);

    fn upsert_batch(&self, chunks: Vec<Chunk>) {
        for chunk in chunks {
            self.upsert(chunk);
        }
    }

    fn get(&self, id: &str) -> Option<Chunk>;

    fn query_text(&self, query: &str, n: usize, filter: Option<&Filter>) -> Vec<QueryResult>;

    fn get_all_embeddings(&self) -> Vec<(String, Vec<f32>, ChunkMetadata)>;

    fn delete_by_path(&self, path: &str) -> usize;

    fn count(&self) -> usize;

    fn clear(&self);
}

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-process reference [`Index`]: a flat store searched by brute-force L2
/// distance over the crate's hash-based embeddings. Fine for test fixtures
/// and small local codebases; not meant to scale to a real corpus.
#[derive(Default)]
pub struct MemoryIndex {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index for MemoryIndex {
    fn upsert(&self, chunk: Chunk) {
        let vector = embed(&chunk.content);
        self.entries.lock().unwrap().insert(chunk.id.clone(), Entry { chunk, vector });
    }

    fn get(&self, id: &str) -> Option<Chunk> {
        self.entries.lock().unwrap().get(id).map(|e| e.chunk.clone())
    }

    fn query_text(&self, query: &str, n: usize, filter: Option<&Filter>) -> Vec<QueryResult> {
        let query_vector = embed(query);
        let entries = self.entries.lock().unwrap();
        let mut results: Vec<QueryResult> = entries
            .values()
            .filter(|entry| filter.map(|f| f.matches(&entry.chunk.metadata)).unwrap_or(true))
            .map(|entry| QueryResult { chunk: entry.chunk.clone(), score: l2_distance(&query_vector, &entry.vector) })
            .collect();
        results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(n);
        results
    }

    fn get_all_embeddings(&self) -> Vec<(String, Vec<f32>, ChunkMetadata)> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(|e| (e.chunk.id.clone(), e.vector.clone(), e.chunk.metadata.clone()))
            .collect()
    }

    fn delete_by_path(&self, path: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let ids: Vec<String> =
            entries.iter().filter(|(_, e)| e.chunk.metadata.path == path).map(|(id, _)| id.clone()).collect();
        for id in &ids {
            entries.remove(id);
        }
        ids.len()
    }

    fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, path: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata { path: path.to_string(), chunk_type: "function".into(), ..Default::default() },
        }
    }

    #[test]
    fn upsert_then_query_returns_closest_first() {
        let index = MemoryIndex::new();
        index.upsert(chunk("a", "a.rs", "fn add(a: i32, b: i32) -> i32 { a + b }"));
        index.upsert(chunk("b", "b.rs", "completely unrelated prose about cooking"));
        let results = index.query_text("fn add(a: i32, b: i32) -> i32 { a + b }", 2, None);
        assert_eq!(results[0].chunk.id, "a");
    }

    #[test]
    fn query_respects_chunk_type_filter() {
        let index = MemoryIndex::new();
        index.upsert(Chunk {
            id: "a".into(),
            content: "fn foo() {}".into(),
            metadata: ChunkMetadata { chunk_type: "function".into(), ..Default::default() },
        });
        index.upsert(Chunk {
            id: "b".into(),
            content: "fn foo() {}".into(),
            metadata: ChunkMetadata { chunk_type: "file".into(), ..Default::default() },
        });
        let filter = Filter { chunk_type: Some("file".into()), path_contains: None };
        let results = index.query_text("fn foo() {}", 10, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }

    #[test]
    fn delete_by_path_removes_only_matching_chunks() {
        let index = MemoryIndex::new();
        index.upsert(chunk("a", "p1.rs", "one"));
        index.upsert(chunk("b", "p2.rs", "two"));
        let removed = index.delete_by_path("p1.rs");
        assert_eq!(removed, 1);
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn clear_empties_the_index() {
        let index = MemoryIndex::new();
        index.upsert(chunk("a", "p.rs", "one"));
        index.clear();
        assert_eq!(index.count(), 0);
    }
}
