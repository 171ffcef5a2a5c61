use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_context_max_tokens() -> u32 {
    8000
}
fn default_reserved_for_response() -> u32 {
    1000
}
fn default_recent_messages() -> usize {
    20
}
fn default_summarize_after() -> usize {
    30
}
fn default_max_rag_tokens() -> u32 {
    2000
}
fn default_max_rag_chunks() -> usize {
    5
}
fn default_session_db_path() -> String {
    "brokerd/sessions.db".to_string()
}
fn default_index_db_path() -> String {
    "brokerd/index.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// One external tool server to launch at startup: a subprocess reached over
/// the MCP stdio dialect (`initialize` / `tools/list` / `tools/call`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Name this server's tools are annotated with in the catalog.
    pub name: String,
    /// Program and arguments, e.g. `["npx", "-y", "some-mcp-server"]`.
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// The full configuration surface the core recognises. Populated by
/// [`crate::loader::load`]: struct defaults, overridden by a TOML file,
/// overridden in turn by `BROKERD_*` environment variables.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model identifier passed to the LLM.
    pub model: String,
    /// Chat-completion endpoint URL.
    pub endpoint: String,
    /// Credential for the configured endpoint. Never logged.
    pub api_key: Option<String>,
    /// Response token ceiling, forwarded to the provider.
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    /// Per-session token budget; `None` means unbounded.
    pub token_budget: Option<u32>,
    pub context_max_tokens: u32,
    pub reserved_for_response: u32,
    pub recent_messages: usize,
    pub summarize_after: usize,
    pub max_rag_tokens: u32,
    pub max_rag_chunks: usize,
    /// Path to the session/conversation/token-usage SQLite file.
    pub session_db_path: String,
    /// Path reserved for a persisted vector index; the in-process reference
    /// `Index` does not read or write it today.
    pub index_db_path: String,
    pub log_level: String,
    /// External tool servers to launch and register with the tool catalog
    /// at startup. Empty by default — `brokerd` ships no built-in tools.
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            max_tokens: None,
            temperature: default_temperature(),
            token_budget: None,
            context_max_tokens: default_context_max_tokens(),
            reserved_for_response: default_reserved_for_response(),
            recent_messages: default_recent_messages(),
            summarize_after: default_summarize_after(),
            max_rag_tokens: default_max_rag_tokens(),
            max_rag_chunks: default_max_rag_chunks(),
            session_db_path: default_session_db_path(),
            index_db_path: default_index_db_path(),
            log_level: default_log_level(),
            tool_servers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("token_budget", &self.token_budget)
            .field("context_max_tokens", &self.context_max_tokens)
            .field("reserved_for_response", &self.reserved_for_response)
            .field("recent_messages", &self.recent_messages)
            .field("summarize_after", &self.summarize_after)
            .field("max_rag_tokens", &self.max_rag_tokens)
            .field("max_rag_chunks", &self.max_rag_chunks)
            .field("session_db_path", &self.session_db_path)
            .field("index_db_path", &self.index_db_path)
            .field("log_level", &self.log_level)
            .field("tool_servers", &self.tool_servers.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}
