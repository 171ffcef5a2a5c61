pub mod catalog;
pub mod host;
pub mod local;
pub mod types;

pub use catalog::ToolCatalog;
pub use host::{McpServer, McpServerConfig, ToolHost, ToolHostError};
pub use local::LocalTool;
pub use types::{ToolDescriptor, ToolResult};
