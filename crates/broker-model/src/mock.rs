use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::provider::{ModelProvider, ResponseStream};
use crate::types::{CompletionRequest, CompletionResult, ResponseEvent, Usage};

/// One canned turn: the text the mock returns, the token usage it reports,
/// and (for streaming) the chunk boundaries to emit — defaults to one chunk
/// equal to the whole content.
#[derive(Debug, Clone)]
pub struct MockTurn {
    pub content: String,
    pub usage: Usage,
    pub chunks: Option<Vec<String>>,
}

impl MockTurn {
    pub fn new(content: impl Into<String>, usage: Usage) -> Self {
        Self { content: content.into(), usage, chunks: None }
    }

    pub fn with_chunks(mut self, chunks: Vec<impl Into<String>>) -> Self {
        self.chunks = Some(chunks.into_iter().map(Into::into).collect());
        self
    }
}

/// A scripted [`ModelProvider`] for deterministic tests: basic turns, tool
/// loop iteration caps, and streaming delta ordering can all be driven by
/// queuing canned turns ahead of time.
///
/// Turns are consumed FIFO; once exhausted, `complete`/`stream` return the
/// last turn again (repeating forever) so a test that doesn't care about the
/// exact turn count (e.g. a tool loop exercising its iteration cap) doesn't
/// need to pre-seed an exact number of responses.
pub struct MockProvider {
    model: String,
    turns: Mutex<VecDeque<MockTurn>>,
}

impl MockProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), turns: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, turn: MockTurn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    fn next_turn(&self) -> MockTurn {
        let mut turns = self.turns.lock().unwrap();
        if turns.len() > 1 {
            turns.pop_front().unwrap()
        } else {
            turns.front().cloned().unwrap_or_else(|| MockTurn::new("", Usage::default()))
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<CompletionResult> {
        let turn = self.next_turn();
        Ok(CompletionResult { content: turn.content, usage: turn.usage, model: self.model.clone() })
    }

    async fn stream(&self, _req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let turn = self.next_turn();
        let chunks = turn.chunks.unwrap_or_else(|| vec![turn.content.clone()]);
        let mut events: Vec<anyhow::Result<ResponseEvent>> =
            chunks.into_iter().map(|c| Ok(ResponseEvent::TextDelta(c))).collect();
        events.push(Ok(ResponseEvent::Usage(turn.usage)));
        events.push(Ok(ResponseEvent::Done));
        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn complete_returns_pushed_turn() {
        let m = MockProvider::new("test-model");
        m.push(MockTurn::new("hello", Usage { input_tokens: 3, output_tokens: 2 }));
        let req = CompletionRequest { messages: vec![], model: "test-model".into(), max_tokens: None, temperature: None };
        let result = m.complete(req).await.unwrap();
        assert_eq!(result.content, "hello");
        assert_eq!(result.usage.input_tokens, 3);
    }

    #[tokio::test]
    async fn stream_emits_chunks_in_order_then_usage_then_done() {
        let m = MockProvider::new("test-model");
        m.push(MockTurn::new("Hello!", Usage { input_tokens: 1, output_tokens: 1 }).with_chunks(vec!["Hel", "lo", "!"]));
        let req = CompletionRequest { messages: vec![], model: "test-model".into(), max_tokens: None, temperature: None };
        let events: Vec<_> = m.stream(req).await.unwrap().collect().await;
        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| match e.as_ref().unwrap() {
                ResponseEvent::TextDelta(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo", "!"]);
        assert!(matches!(events.last().unwrap().as_ref().unwrap(), ResponseEvent::Done));
    }

    #[tokio::test]
    async fn exhausted_queue_repeats_last_turn() {
        let m = MockProvider::new("m");
        m.push(MockTurn::new("only", Usage::default()));
        let req = || CompletionRequest { messages: vec![], model: "m".into(), max_tokens: None, temperature: None };
        let first = m.complete(req()).await.unwrap();
        let second = m.complete(req()).await.unwrap();
        assert_eq!(first.content, second.content);
    }
}
