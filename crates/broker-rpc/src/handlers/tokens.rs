use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{internal, no_active_session, parse_params};
use crate::state::AppState;
use broker_protocol::RpcError;

pub async fn get(state: &AppState) -> Result<Value, RpcError> {
    let session_id = state.session_id().ok_or_else(no_active_session)?;
    let ledger = state.ledger_for(&session_id);
    let stats = ledger.get_session_stats().map_err(internal)?;
    let remaining = ledger.get_budget_remaining().map_err(internal)?;
    let percentage = ledger.get_budget_percentage().map_err(internal)?;
    let over_budget = ledger.is_over_budget().map_err(internal)?;

    Ok(json!({
        "total_input": stats.total_input,
        "total_output": stats.total_output,
        "total_tokens": stats.total_tokens(),
        "total_cost": stats.rounded_cost(),
        "request_count": stats.request_count,
        "budget": state.budget(),
        "budget_remaining": remaining,
        "budget_percentage": percentage,
        "over_budget": over_budget,
    }))
}

#[derive(Deserialize)]
struct SetBudgetParams {
    #[serde(default)]
    budget: Option<u32>,
}

pub async fn set_budget(state: &AppState, params: Value) -> Result<Value, RpcError> {
    let req: SetBudgetParams = parse_params(params)?;
    state.set_budget(req.budget);
    Ok(json!({ "budget": req.budget }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::mock_app_state;

    #[tokio::test]
    async fn get_errors_without_an_active_session() {
        let (state, _mock) = mock_app_state();
        let err = get(&state).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::SessionNotFound.code());
    }

    #[tokio::test]
    async fn get_reports_zero_usage_for_a_fresh_session() {
        let (state, _mock) = mock_app_state();
        state.set_session(Some("s1".to_string()));
        let value = get(&state).await.unwrap();
        assert_eq!(value["total_tokens"], 0);
        assert_eq!(value["request_count"], 0);
        assert_eq!(value["over_budget"], false);
    }

    #[tokio::test]
    async fn set_budget_is_reflected_on_the_next_get() {
        let (state, _mock) = mock_app_state();
        state.set_session(Some("s1".to_string()));
        set_budget(&state, json!({ "budget": 100 })).await.unwrap();
        let value = get(&state).await.unwrap();
        assert_eq!(value["budget"], 100);
    }

    #[tokio::test]
    async fn set_budget_with_no_value_clears_it() {
        let (state, _mock) = mock_app_state();
        set_budget(&state, json!({ "budget": 50 })).await.unwrap();
        set_budget(&state, json!({})).await.unwrap();
        assert_eq!(state.budget(), None);
    }
}
