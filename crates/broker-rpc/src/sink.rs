//! Wires `broker_core::StreamSink` to real `chat.stream` notifications on
//! the wire, so the turn engine never has to know what a JSON-RPC frame
//! looks like.

use async_trait::async_trait;
use broker_protocol::{FrameWriter, Notification};
use broker_tokens::TokenUsage;
use serde_json::json;
use tokio::io::AsyncWrite;

use broker_core::StreamSink;

pub struct NotificationSink<W> {
    writer: FrameWriter<W>,
}

impl<W> NotificationSink<W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> StreamSink for NotificationSink<W> {
    async fn chunk(&self, text: &str) {
        let note = Notification::new("chat.stream", json!({ "chunk": text }));
        if let Err(e) = self.writer.write_notification(&note).await {
            tracing::warn!(error = %e, "failed to write chat.stream chunk notification");
        }
    }

    async fn done(&self, usage: Option<&TokenUsage>) {
        let tokens = usage.map(|u| {
            json!({
                "input_tokens": u.input_tokens,
                "output_tokens": u.output_tokens,
                "total_tokens": u.total(),
                "model": u.model,
            })
        });
        let note = Notification::new("chat.stream", json!({ "done": true, "tokens": tokens }));
        if let Err(e) = self.writer.write_notification(&note).await {
            tracing::warn!(error = %e, "failed to write chat.stream done notification");
        }
    }
}
