use serde_json::Value;

/// The outcome of calling a tool, whether local or external.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { success: true, content: content.into(), error: None, is_error: false }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { success: false, content: String::new(), error: Some(message), is_error: true }
    }
}

/// A tool's advertised shape: what it's called, what it does, and the JSON
/// schema its arguments must satisfy.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Empty for an in-process tool; the server name for an external one.
    pub server_name: String,
}
