use serde::{Deserialize, Serialize};

/// A role in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single message handed to (or returned from) the model.
///
/// Unlike a structured function-calling wire format, tool invocations here
/// are plain text embedded in an assistant message, detected downstream by
/// the tool loop — so `Message` carries nothing beyond role + text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }
    pub fn tool(text: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: text.into() }
    }
}

/// Request sent to a [`crate::ModelProvider`].
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Token usage reported by the provider for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The result of a non-streaming [`crate::ModelProvider::complete`] call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub usage: Usage,
    pub model: String,
}

/// One event in a streamed completion.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    TextDelta(String),
    Usage(Usage),
    Done,
    Error(String),
}
