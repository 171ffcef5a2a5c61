use std::collections::HashMap;

use broker_rag::{Chunk, ChunkMetadata, Filter, Index, Retrieval};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{internal, invalid_params, parse_params};
use crate::state::AppState;
use broker_protocol::RpcError;

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_n_results")]
    n_results: usize,
    #[serde(rename = "type", default)]
    chunk_type: Option<String>,
}
fn default_n_results() -> usize {
    10
}

pub async fn search(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: SearchParams = parse_params(params)?;
    let Some(index) = state.index_router.active() else {
        return Ok(json!({ "results": [] }));
    };
    let filter = req.chunk_type.map(|chunk_type| Filter { chunk_type: Some(chunk_type), path_contains: None });
    let retrieval = Retrieval::new(index);
    let results = retrieval.search(&req.query, req.n_results, filter.as_ref());
    let results_json: Vec<Value> = results
        .into_iter()
        .map(|r| {
            json!({
                "id": r.chunk.id,
                "path": r.chunk.metadata.path,
                "chunk_type": r.chunk.metadata.chunk_type,
                "signature": r.chunk.metadata.signature,
                "content": r.chunk.content,
                "score": r.score,
                "relevance": r.relevance(),
            })
        })
        .collect();
    Ok(json!({ "results": results_json }))
}

#[derive(Deserialize, Default)]
struct IngestChunk {
    #[serde(default)]
    id: Option<String>,
    content: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    language: String,
    #[serde(default = "default_chunk_type")]
    chunk_type: String,
    #[serde(default)]
    signature: String,
}
fn default_chunk_type() -> String {
    "file".to_string()
}

#[derive(Deserialize)]
struct IngestParams {
    #[serde(default)]
    chunks: Vec<IngestChunk>,
    #[serde(default)]
    json_path: Option<String>,
}

pub async fn ingest(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: IngestParams = parse_params(params)?;
    let Some(index) = state.index_router.active() else {
        return Err(invalid_params("no active codebase collection; call codebase.init or session.create with a codebase_path first"));
    };

    let mut chunks = req.chunks;
    if let Some(path) = req.json_path {
        let text = std::fs::read_to_string(&path).map_err(internal)?;
        let extra: Vec<IngestChunk> =
            serde_json::from_str(&text).map_err(|e| invalid_params(format!("invalid json_path contents: {e}")))?;
        chunks.extend(extra);
    }

    let count = chunks.len();
    let built: Vec<Chunk> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, c)| Chunk {
            id: c.id.unwrap_or_else(|| format!("chunk-{}-{}", i, uuid::Uuid::new_v4().simple())),
            content: c.content,
            metadata: ChunkMetadata { path: c.path, language: c.language, chunk_type: c.chunk_type, signature: c.signature, ..Default::default() },
        })
        .collect();
    index.upsert_batch(built);

    Ok(json!({ "ingested": count, "total": index.count() }))
}

pub async fn status(state: &AppState) -> Result<Value, RpcError> {
    let count = state.index_router.active().map(|i| i.count()).unwrap_or(0);
    Ok(json!({
        "count": count,
        "collection": state.index_router.active_collection_name(),
        "path": state.codebase_path(),
    }))
}

pub async fn embeddings(state: &AppState) -> Result<Value, RpcError> {
    let Some(index) = state.index_router.active() else {
        return Ok(json!({ "points": [], "count": 0 }));
    };

    let entries = index.get_all_embeddings();
    let vectors: Vec<(String, Vec<f32>)> = entries.iter().map(|(id, v, _)| (id.clone(), v.clone())).collect();
    let metadata: HashMap<&str, &ChunkMetadata> = entries.iter().map(|(id, _, m)| (id.as_str(), m)).collect();

    let points = broker_rag::project(&vectors);
    let points_json: Vec<Value> = points
        .into_iter()
        .map(|p| {
            let m = metadata.get(p.id.as_str());
            json!({
                "id": p.id,
                "x": p.x,
                "y": p.y,
                "path": m.map(|m| m.path.clone()).unwrap_or_default(),
                "type": m.map(|m| m.chunk_type.clone()).unwrap_or_default(),
            })
        })
        .collect();

    let count = points_json.len();
    Ok(json!({ "points": points_json, "count": count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::mock_app_state;

    #[tokio::test]
    async fn search_with_no_active_codebase_returns_no_results() {
        let (state, _mock) = mock_app_state();
        let value = search(&state, json!({ "query": "anything" })).await.unwrap();
        assert_eq!(value["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ingest_without_an_active_codebase_is_invalid_params() {
        let (state, _mock) = mock_app_state();
        let err = ingest(&state, json!({ "chunks": [{"content": "fn main() {}"}] })).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::InvalidParams.code());
    }

    #[tokio::test]
    async fn ingest_then_search_finds_the_chunk() {
        let (state, _mock) = mock_app_state();
        state.switch_codebase("/tmp/rag-test-project");
        ingest(&state, json!({ "chunks": [{"content": "fn search_widgets() {}", "path": "src/lib.rs"}] })).await.unwrap();
        let value = search(&state, json!({ "query": "search_widgets" })).await.unwrap();
        assert_eq!(value["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_reports_the_active_collection_and_count() {
        let (state, _mock) = mock_app_state();
        state.switch_codebase("/tmp/rag-test-project");
        ingest(&state, json!({ "chunks": [{"content": "a"}, {"content": "b"}] })).await.unwrap();
        let value = status(&state).await.unwrap();
        assert_eq!(value["count"], 2);
        assert!(value["collection"].as_str().is_some());
    }
}
