//! The host (client) side of the MCP dialect: one [`McpServer`] per external
//! tool subprocess, speaking JSON-RPC over the child's stdio through `rmcp`'s
//! client transport rather than a hand-rolled framing loop. [`ToolHost`]
//! supervises a whole fleet of them and merges their tools into one
//! namespace.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use rmcp::model::{CallToolRequestParam, Tool as McpTool};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::types::{ToolDescriptor, ToolResult};

const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ToolHostError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tool server returned an error: {0}")]
    Remote(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("unknown server: {0}")]
    UnknownServer(String),
}

/// Launch configuration for one external tool server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub name: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// A live connection to one external tool subprocess, reached through
/// `rmcp`'s child-process transport. `rmcp` owns the subprocess, the
/// request-id bookkeeping, and the `initialize`/`tools/list` handshake; this
/// struct only remembers what the server advertised so `ToolHost` can route
/// calls by name without re-querying it on every call.
pub struct McpServer {
    name: String,
    client: RunningService<RoleClient, ()>,
    tools: HashMap<String, McpTool>,
}

impl McpServer {
    pub async fn start(config: McpServerConfig) -> Result<Self, ToolHostError> {
        let [program, args @ ..] = config.command.as_slice() else {
            return Err(ToolHostError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty tool server command")));
        };
        let mut command = Command::new(program);
        command.args(args).envs(&config.env);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let transport = TokioChildProcess::new(command)?;
        let client = ().serve(transport).await.map_err(|e| ToolHostError::Remote(e.to_string()))?;

        let discovered = client.list_tools(Default::default()).await.map_err(|e| ToolHostError::Remote(e.to_string()))?;
        let tools = discovered.tools.into_iter().map(|t| (t.name.to_string(), t)).collect();

        Ok(Self { name: config.name, client, tools })
    }

    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or("").to_string(),
                input_schema: serde_json::Value::Object((*t.input_schema).clone()),
                server_name: self.name.clone(),
            })
            .collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        if !self.has_tool(name) {
            return ToolResult::err(format!("Unknown tool: {name}"));
        }
        let arguments = arguments.as_object().cloned();
        let request = CallToolRequestParam { name: name.to_string().into(), arguments };
        match self.client.call_tool(request).await {
            Ok(result) => {
                let is_error = result.is_error.unwrap_or(false);
                let text: Vec<String> = result.content.iter().filter_map(|c| c.as_text().map(|t| t.text.clone())).collect();
                ToolResult { success: !is_error, content: text.join("\n"), error: None, is_error }
            }
            Err(e) => ToolResult::err(e.to_string()),
        }
    }

    /// Asks `rmcp` to end the session, which closes the transport and tears
    /// down the subprocess; gives it [`STOP_GRACE`] before giving up on a
    /// clean shutdown.
    pub async fn stop(self) {
        if tokio::time::timeout(STOP_GRACE, self.client.cancel()).await.is_err() {
            tracing::warn!(server = %self.name, "tool server did not shut down within the grace period");
        }
    }
}

/// Supervises a fleet of [`McpServer`]s and presents their tools as one
/// merged namespace.
#[derive(Default)]
pub struct ToolHost {
    servers: Mutex<HashMap<String, McpServer>>,
    tool_owners: Mutex<HashMap<String, String>>,
}

impl ToolHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_server(&self, config: McpServerConfig) -> Result<(), ToolHostError> {
        let name = config.name.clone();
        let server = McpServer::start(config).await?;
        let descriptors = server.tool_descriptors();
        self.servers.lock().await.insert(name.clone(), server);
        let mut owners = self.tool_owners.lock().await;
        for descriptor in descriptors {
            owners.insert(descriptor.name, name.clone());
        }
        Ok(())
    }

    pub async fn remove_server(&self, name: &str) -> Result<(), ToolHostError> {
        let server = self.servers.lock().await.remove(name).ok_or_else(|| ToolHostError::UnknownServer(name.to_string()))?;
        server.stop().await;
        self.tool_owners.lock().await.retain(|_, owner| owner != name);
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut servers = self.servers.lock().await;
        for (_, server) in servers.drain() {
            server.stop().await;
        }
        self.tool_owners.lock().await.clear();
    }

    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let servers = self.servers.lock().await;
        servers.values().flat_map(|server| server.tool_descriptors()).collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        let owner = { self.tool_owners.lock().await.get(name).cloned() };
        let Some(owner) = owner else {
            return ToolResult::err(format!("Unknown tool: {name}"));
        };
        let servers = self.servers.lock().await;
        let Some(server) = servers.get(&owner) else {
            return ToolResult::err(format!("Server not found: {owner}"));
        };
        server.call_tool(name, arguments).await
    }

    /// Synchronous best-effort emptiness check: if another task currently
    /// holds the lock (adding or removing a server), conservatively reports
    /// non-empty so a caller deciding whether to engage the tool loop errs
    /// on the side of still doing so.
    pub fn is_empty(&self) -> bool {
        self.servers.try_lock().map(|g| g.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_server_command_is_rejected_before_spawning() {
        let config = McpServerConfig { name: "broken".into(), command: vec![], env: HashMap::new(), cwd: None };
        assert!(config.command.is_empty());
    }
}
