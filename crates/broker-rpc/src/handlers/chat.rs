use std::sync::Arc;

use broker_core::{PersistentHistory, StreamSink, TurnRequest};
use broker_protocol::{FrameWriter, Notification, RpcError};
use broker_tokens::SessionTokenStats;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWrite;

use crate::errors::{internal, no_active_session};
use crate::sink::NotificationSink;
use crate::state::AppState;

#[derive(Deserialize)]
struct SendParams {
    message: String,
    #[serde(default)]
    use_rag: bool,
    #[serde(default)]
    stream: bool,
}

fn stats_json(stats: &SessionTokenStats) -> Value {
    json!({
        "total_input": stats.total_input,
        "total_output": stats.total_output,
        "total_tokens": stats.total_tokens(),
        "total_cost": stats.rounded_cost(),
        "request_count": stats.request_count,
    })
}

/// Serves one `chat.send`. Config errors (no endpoint configured) and
/// upstream errors (the model call itself failing) are both reported as a
/// normal, successful response whose `response` text names the problem —
/// per the error-handling design, only protocol/domain/internal failures
/// become JSON-RPC error objects.
pub async fn send<W: AsyncWrite + Unpin + Send + 'static>(
    state: &Arc<AppState>,
    writer: &FrameWriter<W>,
    params: Value,
) -> Result<Value, RpcError> {
    let req: SendParams = crate::errors::parse_params(params)?;
    let session_id = state.session_id().ok_or_else(no_active_session)?;

    if state.config.endpoint.trim().is_empty() {
        return Ok(json!({
            "response": "No model endpoint is configured. Set `endpoint` (and `api_key` if the provider requires one) before sending messages.",
            "tokens": Value::Null,
        }));
    }

    let history = PersistentHistory::new(state.store.conversation(&session_id));
    let ledger = state.ledger_for(&session_id);

    let sink: Option<NotificationSink<W>> = if req.stream { Some(NotificationSink::new(writer.clone())) } else { None };
    let sink_ref: Option<&dyn StreamSink> = sink.as_ref().map(|s| s as &dyn StreamSink);

    let turn_request = TurnRequest { message: req.message, use_rag: req.use_rag, stream: req.stream };
    let outcome = state.turn_engine.run(&session_id, &history, &ledger, turn_request, None, sink_ref).await;

    match outcome {
        Ok(outcome) => {
            let stats = ledger.get_session_stats().map_err(internal)?;
            Ok(json!({ "response": outcome.response, "tokens": stats_json(&stats) }))
        }
        Err(e) => {
            tracing::warn!(error = %e, session_id = %session_id, "chat turn failed");
            if req.stream {
                let note = Notification::new("chat.stream", json!({ "done": true, "tokens": Value::Null }));
                let _ = writer.write_notification(&note).await;
            }
            Ok(json!({ "response": format!("The model request failed: {e}"), "tokens": Value::Null }))
        }
    }
}

/// Reserved; true cancellation of an in-flight turn isn't implemented —
/// `chat.send` runs to completion before the dispatcher reads its next
/// frame, so there is no in-flight turn a concurrently-received
/// `chat.cancel` could reach.
pub async fn cancel(_params: Value) -> Result<Value, RpcError> {
    Ok(json!({ "cancelled": false }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::mock_app_state;
    use broker_model::{MockTurn, Usage};
    use broker_protocol::FrameWriter;

    #[tokio::test]
    async fn errors_without_an_active_session() {
        let (state, _mock) = mock_app_state();
        let state = Arc::new(state);
        let writer = FrameWriter::new(Vec::<u8>::new());
        let err = send(&state, &writer, json!({ "message": "hi" })).await.unwrap_err();
        assert_eq!(err.code, broker_protocol::ErrorCode::SessionNotFound.code());
    }

    #[tokio::test]
    async fn reports_configured_endpoint_missing_as_a_normal_response() {
        let (mut state, _mock) = mock_app_state();
        state.config.endpoint = String::new();
        state.set_session(Some("s1".to_string()));
        let state = Arc::new(state);
        let writer = FrameWriter::new(Vec::<u8>::new());
        let value = send(&state, &writer, json!({ "message": "hi" })).await.unwrap();
        assert!(value["response"].as_str().unwrap().contains("No model endpoint"));
        assert!(value["tokens"].is_null());
    }

    #[tokio::test]
    async fn a_basic_turn_returns_the_models_reply_and_token_stats() {
        let (state, mock) = mock_app_state();
        mock.push(MockTurn::new("hello there", Usage { input_tokens: 5, output_tokens: 3 }));
        state.set_session(Some("s1".to_string()));
        let state = Arc::new(state);
        let writer = FrameWriter::new(Vec::<u8>::new());
        let value = send(&state, &writer, json!({ "message": "hi" })).await.unwrap();
        assert_eq!(value["response"], "hello there");
        assert_eq!(value["tokens"]["total_tokens"], 8);
    }

    #[tokio::test]
    async fn cancel_always_reports_not_cancelled() {
        let value = cancel(Value::Null).await.unwrap();
        assert_eq!(value["cancelled"], false);
    }
}
