use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{internal, invalid_params, parse_params};
use crate::state::AppState;
use broker_protocol::RpcError;

pub async fn get(state: &AppState) -> Result<Value, RpcError> {
    Ok(json!({ "model": state.model.model_name() }))
}

#[derive(Deserialize)]
struct SetParams {
    model: Option<String>,
}

pub async fn set(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: SetParams = parse_params(params)?;
    let model = req.model.filter(|m| !m.trim().is_empty()).ok_or_else(|| invalid_params("model.set requires a non-empty `model` string"))?;
    state.model.set_model(model);
    Ok(json!({ "model": state.model.model_name() }))
}

pub async fn list(state: &AppState) -> Result<Value, RpcError> {
    let models = state.model.list_models().await.map_err(internal)?;
    Ok(json!({ "models": models }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::mock_app_state;

    #[tokio::test]
    async fn get_reports_the_configured_default_model() {
        let (state, _mock) = mock_app_state();
        let value = get(&state).await.unwrap();
        assert_eq!(value["model"], state.config.model);
    }

    #[tokio::test]
    async fn set_changes_what_get_reports() {
        let (state, _mock) = mock_app_state();
        set(&state, json!({ "model": "gpt-4o" })).await.unwrap();
        let value = get(&state).await.unwrap();
        assert_eq!(value["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn set_rejects_an_empty_model_name() {
        let (state, _mock) = mock_app_state();
        let err = set(&state, json!({ "model": "" })).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::InvalidParams.code());
    }

    #[tokio::test]
    async fn set_rejects_a_missing_model_field() {
        let (state, _mock) = mock_app_state();
        let err = set(&state, json!({})).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::InvalidParams.code());
    }
}
