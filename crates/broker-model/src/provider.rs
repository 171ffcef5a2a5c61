use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::types::{CompletionRequest, CompletionResult, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The LLM adapter boundary. The wire protocol of any given upstream model
/// is deliberately kept out of this trait's surface, so implementations
/// need only satisfy it; callers (the Turn Engine) never depend on
/// provider-specific shapes.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name, e.g. `"mock"`, `"openai-compatible"`.
    fn name(&self) -> &str;

    /// The model identifier currently in use. Owned rather than borrowed so
    /// that a provider can report a value that changes at runtime (see
    /// `broker-rpc`'s model-switching wrapper) without pinning its lifetime
    /// to `&self`.
    fn model_name(&self) -> String;

    /// Non-streaming completion.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResult>;

    /// Streaming completion. Implementations emit zero or more `TextDelta`s,
    /// exactly one `Usage`, then `Done` — or `Error` on a non-fatal mid-stream
    /// problem (the stream may still continue or terminate after).
    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Model identifiers this provider can serve. Default: just the
    /// currently configured model.
    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        Ok(vec![self.model_name()])
    }
}
