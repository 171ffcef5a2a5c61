//! JSON-RPC 2.0 framing: one UTF-8 JSON object per line, LF-terminated, on a
//! duplex byte stream (stdin/stdout in `brokerd`, or any other duplex pipe).
//!
//! Three frame shapes cross the wire: [`Request`] (has `id`), [`Notification`]
//! (no `id`), [`Response`] (has `id`, either `result` or `error`). Reading is
//! handled by [`FrameReader`]; writing by [`FrameWriter`], which serialises
//! concurrent writers (a handler's response vs. a server-initiated
//! notification) behind a single lock so no two frames interleave on one
//! output line.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Standard JSON-RPC error codes plus this server's application-specific
/// ones in the `-32000` reserved range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    SessionNotFound,
    ToolNotFound,
    BudgetExceeded,
    Cancelled,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::SessionNotFound => -32001,
            ErrorCode::ToolNotFound => -32002,
            ErrorCode::BudgetExceeded => -32003,
            ErrorCode::Cancelled => -32004,
        }
    }

    /// Default human-readable message for this code, used when a caller does
    /// not supply a more specific one.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::SessionNotFound => "Session not found",
            ErrorCode::ToolNotFound => "Tool not found",
            ErrorCode::BudgetExceeded => "Budget exceeded",
            ErrorCode::Cancelled => "Cancelled",
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code: code.code(), message: message.into(), data: None }
    }

    /// Build an [`RpcError`] using `code`'s default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An incoming JSON-RPC request (carries an `id`, expects a [`Response`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// An incoming JSON-RPC notification (no `id`, never answered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: jsonrpc_version(), method: method.into(), params: Some(params) }
    }
}

/// An outgoing JSON-RPC response, correlated to a [`Request`] by `id`.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Result { result: Value },
    Error { error: RpcError },
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, outcome: ResponseOutcome::Result { result } }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self { jsonrpc: jsonrpc_version(), id, outcome: ResponseOutcome::Error { error } }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Error { .. })
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// One incoming frame: either a request awaiting a response, or a
/// notification that must never be answered.
#[derive(Debug, Clone)]
pub enum IncomingFrame {
    Request(Request),
    Notification(Notification),
}

impl IncomingFrame {
    pub fn method(&self) -> &str {
        match self {
            IncomingFrame::Request(r) => &r.method,
            IncomingFrame::Notification(n) => &n.method,
        }
    }

    pub fn params(&self) -> Option<&Value> {
        match self {
            IncomingFrame::Request(r) => r.params.as_ref(),
            IncomingFrame::Notification(n) => n.params.as_ref(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error reading frame: {0}")]
    Io(#[from] std::io::Error),
    /// The line was not valid JSON, or not a valid Request/Notification
    /// shape. Carries the line verbatim so the caller can emit a
    /// parse-error response with `id = null`.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Reads one JSON-RPC frame at a time from a newline-delimited stream.
pub struct FrameReader<R> {
    lines: tokio::io::Lines<BufReader<R>>,
}

impl<R: tokio::io::AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: BufReader::new(reader).lines() }
    }

    /// Read the next frame. Returns `Ok(None)` on clean EOF.
    ///
    /// A malformed line yields `Err(CodecError::Malformed)` rather than
    /// terminating the stream — the caller should respond with a
    /// parse-error response (`id: null`) and keep reading.
    pub async fn read_frame(&mut self) -> Result<Option<IncomingFrame>, CodecError> {
        let Some(line) = self.lines.next_line().await? else {
            return Ok(None);
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            // Blank lines are tolerated (not a frame); recurse for the next one.
            return Box::pin(self.read_frame()).await;
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| CodecError::Malformed(format!("invalid JSON: {e}")))?;
        parse_incoming(value).ok_or_else(|| {
            CodecError::Malformed("object is neither a request nor a notification".to_string())
        })
    }
}

fn parse_incoming(value: Value) -> Option<Result<IncomingFrame, CodecError>> {
    let obj = value.as_object()?;
    let method = obj.get("method")?.as_str()?.to_string();
    let params = obj.get("params").cloned();
    if let Some(id) = obj.get("id") {
        Some(Ok(IncomingFrame::Request(Request {
            jsonrpc: jsonrpc_version(),
            id: id.clone(),
            method,
            params,
        })))
    } else {
        Some(Ok(IncomingFrame::Notification(Notification {
            jsonrpc: jsonrpc_version(),
            method,
            params,
        })))
    }
}

/// Serialises concurrent writers of [`Response`]s and server-initiated
/// [`Notification`]s onto one output stream, one frame per line.
///
/// Cloning a [`FrameWriter`] shares the same underlying lock, so the Turn
/// Engine's streaming notifications and the dispatcher's final response to
/// an unrelated request never interleave mid-line.
pub struct FrameWriter<W> {
    inner: Arc<Mutex<W>>,
}

// Manual impl: `#[derive(Clone)]` would add a `W: Clone` bound, but cloning
// only ever shares the `Arc`, never the writer itself — and `brokerd`'s own
// writer (`tokio::io::Stdout`) isn't `Clone`.
impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: Arc::new(Mutex::new(writer)) }
    }

    pub async fn write_response(&self, response: &Response) -> std::io::Result<()> {
        self.write_line(&serde_json::to_string(response).expect("Response always serialises"))
            .await
    }

    pub async fn write_notification(&self, notification: &Notification) -> std::io::Result<()> {
        self.write_line(
            &serde_json::to_string(notification).expect("Notification always serialises"),
        )
        .await
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await
    }
}
