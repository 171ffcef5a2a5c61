//! Maps handler failures onto the wire's error taxonomy. Nothing outside
//! this module should build an [`RpcError`] by hand — that way every
//! handler's failures go through the same classification and logging.

use broker_protocol::{ErrorCode, RpcError};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| invalid_params(format!("invalid params: {e}")))
}

pub fn invalid_params(message: impl Into<String>) -> RpcError {
    RpcError::new(ErrorCode::InvalidParams, message)
}

pub fn session_not_found(session_id: &str) -> RpcError {
    RpcError::new(ErrorCode::SessionNotFound, format!("session not found: {session_id}"))
}

pub fn no_active_session() -> RpcError {
    RpcError::from_code(ErrorCode::SessionNotFound)
}

/// Bug-class failures: storage errors, filesystem errors, anything that
/// indicates a broken invariant rather than bad input. Logged at `error`
/// level since these should not happen in normal operation.
pub fn internal(err: impl std::fmt::Display) -> RpcError {
    tracing::error!(error = %err, "internal error servicing request");
    RpcError::from_code(ErrorCode::InternalError)
}
