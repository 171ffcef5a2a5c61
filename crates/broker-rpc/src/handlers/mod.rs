pub mod chat;
pub mod codebase;
pub mod model;
pub mod rag;
pub mod session;
pub mod tokens;

use std::sync::Arc;

use broker_protocol::{ErrorCode, FrameWriter, Request, Response, RpcError};
use serde_json::Value;
use tokio::io::AsyncWrite;

use crate::state::AppState;

/// Routes one request to its handler and folds the result into a
/// [`Response`]. The dispatcher loop calls this once per incoming request,
/// to completion, before reading the next frame — see `Dispatcher::run`.
pub async fn dispatch<W: AsyncWrite + Unpin + Send + 'static>(
    state: &Arc<AppState>,
    writer: &FrameWriter<W>,
    request: Request,
) -> Response {
    let id = request.id.clone();
    let params = request.params.unwrap_or(Value::Null);

    let result = match request.method.as_str() {
        "chat.send" => chat::send(state, writer, params).await,
        "chat.cancel" => chat::cancel(params).await,
        "session.create" => session::create(state, params).await,
        "session.load" => session::load(state, params).await,
        "session.list" => session::list(state, params).await,
        "session.delete" => session::delete(state, params).await,
        "tokens.get" => tokens::get(state).await,
        "tokens.set_budget" => tokens::set_budget(state, params).await,
        "model.get" => model::get(state).await,
        "model.set" => model::set(state, params).await,
        "model.list" => model::list(state).await,
        "rag.search" => rag::search(state, params).await,
        "rag.ingest" => rag::ingest(state, params).await,
        "rag.status" => rag::status(state).await,
        "rag.embeddings" => rag::embeddings(state).await,
        "codebase.init" => codebase::init(state, params).await,
        other => Err(RpcError::new(ErrorCode::MethodNotFound, format!("unknown method: {other}"))),
    };

    match result {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::err(id, err),
    }
}
