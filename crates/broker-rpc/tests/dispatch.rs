//! End-to-end tests driving a real [`Dispatcher`] over in-memory duplex
//! pipes, sending raw JSON-RPC lines and validating the responses exactly
//! as a real frontend would see them.

use std::sync::Arc;

use async_trait::async_trait;
use broker_config::Config;
use broker_core::{TurnConfig, TurnEngine};
use broker_memory::Store;
use broker_model::{MockProvider, MockTurn, ModelProvider, Usage};
use broker_rag::IndexRouter;
use broker_rpc::{AppState, Dispatcher, SwitchableModel};
use broker_tools::{LocalTool, ToolCatalog, ToolResult};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

struct NoopTool;

#[async_trait]
impl LocalTool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }
    fn description(&self) -> &str {
        "does nothing, for exercising the tool loop"
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }
    async fn call(&self, _arguments: Value) -> ToolResult {
        ToolResult::ok(r#"{"ok":true}"#)
    }
}

/// Starts a [`Dispatcher`] in a background task over a pair of connected
/// in-memory pipes. Returns the client's write half and a buffered reader
/// over the client's read half.
async fn start_test_server(mock: Arc<MockProvider>, with_tools: bool) -> (WriteHalf<DuplexStream>, BufReader<ReadHalf<DuplexStream>>) {
    let (client_stream, server_stream) = tokio::io::duplex(65536);

    let config = Config::default();
    let store = Store::open_in_memory().unwrap();
    let index_router = Arc::new(IndexRouter::new());
    let model = Arc::new(SwitchableModel::new(mock as Arc<dyn ModelProvider>));

    let tools = if with_tools {
        let mut catalog = ToolCatalog::new();
        catalog.register_local(Arc::new(NoopTool));
        Some(Arc::new(catalog))
    } else {
        None
    };

    let turn_engine = TurnEngine::new(
        model.clone() as Arc<dyn ModelProvider>,
        None,
        Some(index_router.clone()),
        tools,
        TurnConfig::default(),
    );
    let state = AppState::new(config, store, index_router, model, turn_engine);

    let (server_read, server_write) = tokio::io::split(server_stream);
    let mut dispatcher = Dispatcher::new(server_read, server_write, state);
    tokio::spawn(async move {
        let _ = dispatcher.run().await;
    });

    let (client_read, client_write) = tokio::io::split(client_stream);
    (client_write, BufReader::new(client_read))
}

async fn send_msg(writer: &mut WriteHalf<DuplexStream>, msg: &Value) {
    let line = serde_json::to_string(msg).unwrap();
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
    writer.flush().await.unwrap();
}

async fn recv_msg(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> Value {
    let mut line = String::new();
    tokio::time::timeout(std::time::Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a server frame")
        .expect("read error");
    serde_json::from_str(line.trim()).expect("server frame must be valid JSON")
}

// S1: basic turn — session.create, then chat.send, returns the model's reply.
#[tokio::test]
async fn s1_basic_turn_round_trip() {
    let mock = Arc::new(MockProvider::new("mock"));
    mock.push(MockTurn::new("hello, world", Usage { input_tokens: 4, output_tokens: 2 }));
    let (mut writer, mut reader) = start_test_server(mock, false).await;

    let ready = recv_msg(&mut reader).await;
    assert_eq!(ready["method"], "server.ready");

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 1, "method": "session.create", "params": {}})).await;
    let created = recv_msg(&mut reader).await;
    assert!(created["result"]["id"].as_str().is_some());

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 2, "method": "chat.send", "params": {"message": "hi"}})).await;
    let answered = recv_msg(&mut reader).await;
    assert_eq!(answered["result"]["response"], "hello, world");
    assert_eq!(answered["result"]["tokens"]["total_tokens"], 6);
}

// S4: tool loop capped at 3 iterations, final text names "maximum".
#[tokio::test]
async fn s4_tool_loop_hits_its_iteration_cap() {
    let mock = Arc::new(MockProvider::new("mock"));
    mock.push(MockTurn::new(r#"{"tool": "noop", "args": {}}"#, Usage::default()));
    let (mut writer, mut reader) = start_test_server(mock, true).await;

    recv_msg(&mut reader).await; // server.ready

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 1, "method": "session.create", "params": {}})).await;
    recv_msg(&mut reader).await;

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 2, "method": "chat.send", "params": {"message": "loop forever"}})).await;
    let answered = recv_msg(&mut reader).await;
    let response = answered["result"]["response"].as_str().unwrap();
    assert!(response.to_lowercase().contains("maximum"), "expected cap message, got: {response}");
}

// S5: streaming preserves chunk ordering and persists the concatenated text.
#[tokio::test]
async fn s5_streaming_preserves_chunk_order_and_persists_full_text() {
    let mock = Arc::new(MockProvider::new("mock"));
    mock.push(MockTurn::new("Hello!", Usage { input_tokens: 1, output_tokens: 1 }).with_chunks(vec!["Hel", "lo", "!"]));
    let (mut writer, mut reader) = start_test_server(mock, false).await;

    recv_msg(&mut reader).await; // server.ready

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 1, "method": "session.create", "params": {}})).await;
    let created = recv_msg(&mut reader).await;
    let session_id = created["result"]["id"].as_str().unwrap().to_string();

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 2, "method": "chat.send", "params": {"message": "hi", "stream": true}})).await;

    // Notifications are written to completion before the dispatcher's final
    // response to this same request — chunks, then "done", then the result.
    let mut chunks = Vec::new();
    loop {
        let frame = recv_msg(&mut reader).await;
        if frame["method"] == "chat.stream" && frame["params"]["done"] != true {
            chunks.push(frame["params"]["chunk"].as_str().unwrap().to_string());
        } else if frame["method"] == "chat.stream" {
            break; // the "done" notification
        } else {
            panic!("expected a chat.stream notification before the response, got: {frame}");
        }
    }
    assert_eq!(chunks, vec!["Hel", "lo", "!"]);

    let answered = recv_msg(&mut reader).await;
    assert_eq!(answered["result"]["response"], "Hello!");

    send_msg(&mut writer, &json!({"jsonrpc": "2.0", "id": 3, "method": "session.load", "params": {"id": session_id}})).await;
    let loaded = recv_msg(&mut reader).await;
    assert_eq!(loaded["result"]["id"], session_id);
}
