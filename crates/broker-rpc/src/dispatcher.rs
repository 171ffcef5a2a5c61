use std::marker::Unpin;
use std::sync::Arc;

use broker_protocol::{CodecError, ErrorCode, FrameReader, FrameWriter, IncomingFrame, Notification, Response, RpcError};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::handlers;
use crate::state::AppState;

/// Services one connection: reads frames one at a time and routes requests
/// to handlers. Each request is dispatched on its own task so the read loop
/// can immediately go back to the wire — a `chat.cancel` (or any other
/// request) sent while a `chat.send` is still running is read and handled
/// without waiting for that turn to finish. `AppState`'s mutable fields and
/// `Store`'s connection are already mutex-guarded, so handlers running
/// concurrently across tasks need no additional locking here.
pub struct Dispatcher<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    state: Arc<AppState>,
}

impl<R, W> Dispatcher<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W, state: AppState) -> Self {
        Self { reader: FrameReader::new(reader), writer: FrameWriter::new(writer), state: Arc::new(state) }
    }

    /// Runs until the input stream hits clean EOF (`Ok(())`) or a fatal I/O
    /// error (`Err`). Emits the one-time `server.ready` notification first.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let ready = Notification::new("server.ready", json!({ "version": env!("CARGO_PKG_VERSION") }));
        self.writer.write_notification(&ready).await?;

        loop {
            let frame = match self.reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(CodecError::Malformed(msg)) => {
                    tracing::warn!(error = %msg, "discarding malformed frame");
                    let response = Response::err(Value::Null, RpcError::new(ErrorCode::ParseError, msg));
                    self.writer.write_response(&response).await?;
                    continue;
                }
                Err(CodecError::Io(e)) => return Err(e.into()),
            };

            match frame {
                IncomingFrame::Notification(n) => {
                    tracing::debug!(method = %n.method, "ignoring notification (no method accepts one)");
                }
                IncomingFrame::Request(request) => {
                    let state = self.state.clone();
                    let writer = self.writer.clone();
                    tokio::spawn(async move {
                        let method = request.method.clone();
                        let response = handlers::dispatch(&state, &writer, request).await;
                        if response.is_error() {
                            tracing::debug!(method = %method, "request failed");
                        }
                        if let Err(e) = writer.write_response(&response).await {
                            tracing::warn!(method = %method, error = %e, "failed to write response");
                        }
                    });
                }
            }
        }
    }
}
