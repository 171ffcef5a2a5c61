//! Merges locally-registered tools with tools discovered on external MCP
//! servers into one flat namespace that the turn engine can call by name
//! without caring where a given tool actually runs.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::host::{McpServerConfig, ToolHost, ToolHostError};
use crate::local::LocalTool;
use crate::types::{ToolDescriptor, ToolResult};

pub struct ToolCatalog {
    local: HashMap<String, Arc<dyn LocalTool>>,
    host: ToolHost,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self { local: HashMap::new(), host: ToolHost::new() }
    }

    pub fn register_local(&mut self, tool: Arc<dyn LocalTool>) {
        self.local.insert(tool.name().to_string(), tool);
    }

    /// True when no local tool is registered and no external server is
    /// currently connected — the turn engine uses this to skip the tool
    /// loop entirely rather than re-prompt through an empty catalog.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.host.is_empty()
    }

    pub async fn add_server(&self, config: McpServerConfig) -> Result<(), ToolHostError> {
        self.host.add_server(config).await
    }

    pub async fn remove_server(&self, name: &str) -> Result<(), ToolHostError> {
        self.host.remove_server(name).await
    }

    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }

    /// All tools visible to the turn engine: local tools first, then
    /// whatever the external servers currently advertise.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut all: Vec<ToolDescriptor> = self
            .local
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                server_name: String::new(),
            })
            .collect();
        all.extend(self.host.list_tools().await);
        all
    }

    /// Renders the catalog as the compact `{name, description, args}` shape
    /// prompts embed so the model knows what it can call.
    pub async fn to_llm_format(&self) -> Value {
        let tools = self.list_tools().await;
        Value::Array(
            tools
                .into_iter()
                .map(|t| serde_json::json!({"name": t.name, "description": t.description, "args": t.input_schema}))
                .collect(),
        )
    }

    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        if let Some(tool) = self.local.get(name) {
            return tool.call(arguments).await;
        }
        self.host.call_tool(name, arguments).await
    }
}
