use async_trait::async_trait;
use serde_json::Value;

use crate::types::ToolResult;

/// An in-process tool: runs in the same address space as the dispatcher,
/// as opposed to an external tool reached through the [`crate::ToolHost`]'s
/// subprocess JSON-RPC channel.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn call(&self, arguments: Value) -> ToolResult;
}
