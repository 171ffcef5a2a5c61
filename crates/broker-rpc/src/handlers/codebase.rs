use broker_rag::{Chunk, ChunkMetadata, Index};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{internal, parse_params};
use crate::state::AppState;
use broker_protocol::RpcError;

#[derive(Deserialize)]
struct InitParams {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    clear: bool,
}

/// Walks a codebase and ingests it as whole-file chunks. Semantic chunking
/// (functions, classes) is left to the caller via `rag.ingest`, matching the
/// scanner's own scope.
pub async fn init(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: InitParams = parse_params(params)?;
    let path = req.path.unwrap_or_else(|| ".".to_string());
    let abs = std::fs::canonicalize(&path).map_err(internal)?;
    let abs_str = abs.to_string_lossy().to_string();

    let index = state.switch_codebase(&abs_str);
    if req.clear {
        index.clear();
    }

    let (files, stats) = broker_rag::scan(&abs);
    let chunks: Vec<Chunk> = files
        .into_iter()
        .map(|f| Chunk {
            id: f.relative_path.clone(),
            content: f.content,
            metadata: ChunkMetadata { path: f.relative_path, language: f.language.to_string(), chunk_type: "file".to_string(), ..Default::default() },
        })
        .collect();
    index.upsert_batch(chunks);

    Ok(json!({
        "path": abs_str,
        "total_files": stats.total_files,
        "by_language": stats.by_language,
        "indexed": index.count(),
    }))
}
