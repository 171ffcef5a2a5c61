use broker_memory::Session;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{internal, parse_params, session_not_found};
use crate::state::AppState;
use broker_protocol::RpcError;

fn session_json(session: &Session) -> Value {
    json!({
        "id": session.id,
        "name": session.name,
        "codebase_path": session.codebase_path,
        "created_at": session.created_at.to_rfc3339(),
        "last_accessed": session.last_accessed.to_rfc3339(),
    })
}

/// Resolves `codebase_path` (if given) to an absolute path and switches the
/// shared index router to it. Paths that don't exist yet are kept verbatim
/// rather than rejected — `codebase.init` is what actually has to read the
/// directory.
fn switch_codebase_if_given(state: &AppState, codebase_path: &Option<String>) {
    let Some(path) = codebase_path else { return };
    let abs = std::fs::canonicalize(path).map(|p| p.to_string_lossy().to_string()).unwrap_or_else(|_| path.clone());
    state.switch_codebase(&abs);
}

#[derive(Deserialize)]
pub struct CreateParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    codebase_path: Option<String>,
}

pub async fn create(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: CreateParams = parse_params(params)?;
    let session = state.store.sessions().create(req.name, req.codebase_path.clone(), None).map_err(internal)?;
    switch_codebase_if_given(state, &req.codebase_path);
    state.set_session(Some(session.id.clone()));
    Ok(session_json(&session))
}

#[derive(Deserialize)]
struct LoadParams {
    id: String,
}

pub async fn load(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: LoadParams = parse_params(params)?;
    let session = state.store.sessions().load(&req.id).map_err(internal)?.ok_or_else(|| session_not_found(&req.id))?;
    switch_codebase_if_given(state, &session.codebase_path);
    state.set_session(Some(session.id.clone()));
    Ok(session_json(&session))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: u32,
}
fn default_limit() -> u32 {
    20
}

pub async fn list(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: ListParams = parse_params(params)?;
    let sessions = state.store.sessions().get_recent(req.limit).map_err(internal)?;
    let sessions_json: Vec<Value> = sessions.iter().map(session_json).collect();
    Ok(json!({ "sessions": sessions_json }))
}

#[derive(Deserialize)]
struct DeleteParams {
    id: String,
}

pub async fn delete(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: DeleteParams = parse_params(params)?;
    let deleted = state.store.sessions().delete(&req.id).map_err(internal)?;
    if deleted && state.session_id().as_deref() == Some(req.id.as_str()) {
        state.set_session(None);
    }
    Ok(json!({ "deleted": deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::mock_app_state;

    #[tokio::test]
    async fn create_sets_it_as_the_current_session() {
        let (state, _mock) = mock_app_state();
        let value = create(&state, json!({ "name": "alpha" })).await.unwrap();
        let id = value["id"].as_str().unwrap().to_string();
        assert_eq!(state.session_id().as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn load_unknown_id_is_a_session_not_found_error() {
        let (state, _mock) = mock_app_state();
        let err = load(&state, json!({ "id": "does-not-exist" })).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::SessionNotFound.code());
    }

    #[tokio::test]
    async fn load_switches_the_current_session() {
        let (state, _mock) = mock_app_state();
        let created = create(&state, json!({ "name": "alpha" })).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        state.set_session(None);
        let loaded = load(&state, json!({ "id": id })).await.unwrap();
        assert_eq!(loaded["id"], id);
        assert_eq!(state.session_id().as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn deleting_the_current_session_clears_it() {
        let (state, _mock) = mock_app_state();
        let created = create(&state, json!({})).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let value = delete(&state, json!({ "id": id })).await.unwrap();
        assert_eq!(value["deleted"], true);
        assert!(state.session_id().is_none());
    }

    #[tokio::test]
    async fn list_defaults_to_twenty() {
        let (state, _mock) = mock_app_state();
        for i in 0..3 {
            create(&state, json!({ "name": format!("s{i}") })).await.unwrap();
        }
        let value = list(&state, json!({})).await.unwrap();
        assert_eq!(value["sessions"].as_array().unwrap().len(), 3);
    }
}
