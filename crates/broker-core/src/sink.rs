//! The turn engine never constructs JSON-RPC notifications itself — it
//! reports streaming progress through this trait so that `broker-rpc` (the
//! only crate that knows what a `chat.stream` notification looks like) can
//! wire it straight to the wire.

use async_trait::async_trait;

use broker_tokens::TokenUsage;

#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn chunk(&self, text: &str);
    async fn done(&self, usage: Option<&TokenUsage>);
}
