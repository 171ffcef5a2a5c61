//! Turn engine: the part of the system that serves one `chat.send` request.
//! Wires together intent extraction, retrieval, context assembly, the
//! model, the token ledger, and (when configured) the tool loop.

pub mod history;
pub mod sink;
pub mod tool_loop;

use std::sync::Arc;

use broker_context::{ContextConfig, ContextManager, HistoryMessage};
use broker_intent::IntentExtractor;
use broker_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, Role};
use broker_rag::IndexRouter;
use broker_tokens::{TokenLedger, TokenUsage};
use broker_tools::ToolCatalog;

pub use history::{EphemeralHistory, History, PersistentHistory};
pub use sink::StreamSink;
pub use tool_loop::{ToolCallRecord, ToolLoopOutcome};

use futures::StreamExt;

/// Configuration for one `TurnEngine` instance.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub context: ContextConfig,
    pub max_rag_tokens: u32,
    pub max_rag_chunks: usize,
    pub max_tool_iterations: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { context: ContextConfig::default(), max_rag_tokens: 2000, max_rag_chunks: 5, max_tool_iterations: 10 }
    }
}

/// Params for one `chat.send`-equivalent call.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub use_rag: bool,
    pub stream: bool,
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub usage: TokenUsage,
}

pub struct TurnEngine {
    model: Arc<dyn ModelProvider>,
    intent: Option<Arc<dyn IntentExtractor>>,
    index_router: Option<Arc<IndexRouter>>,
    tools: Option<Arc<ToolCatalog>>,
    context: ContextManager,
    config: TurnConfig,
}

impl TurnEngine {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        intent: Option<Arc<dyn IntentExtractor>>,
        index_router: Option<Arc<IndexRouter>>,
        tools: Option<Arc<ToolCatalog>>,
        config: TurnConfig,
    ) -> Self {
        let context = ContextManager::new(config.context);
        Self { model, intent, index_router, tools, context, config }
    }

    /// Serves one turn end to end: builds the retrieval query, fetches RAG
    /// context, assembles the context window, persists the user message,
    /// calls the model (streaming through `sink` when requested and
    /// available, or via the tool loop when a tool catalog is configured),
    /// records token usage, and persists the assistant's reply.
    pub async fn run(
        &self,
        session_id: &str,
        history: &dyn History,
        ledger: &TokenLedger,
        request: TurnRequest,
        system_prompt: Option<&str>,
        sink: Option<&dyn StreamSink>,
    ) -> anyhow::Result<TurnOutcome> {
        let query = self.retrieval_query(&request.message, history).await;

        let rag_context = if request.use_rag { self.rag_context(&query) } else { None };

        let all_messages = history.all();
        let recent = history.recent(self.config.context.recent_messages);
        let window = self.context.build(
            session_id,
            &all_messages,
            &recent,
            &request.message,
            system_prompt,
            rag_context.as_deref(),
        );

        history.add("user", &request.message, estimate_tokens(&request.message));

        let model_messages: Vec<Message> = window.messages.iter().map(to_model_message).collect();
        let model_name = self.model.model_name().to_string();

        // Streaming takes priority over the tool loop: a caller that asks for
        // `chat.stream` notifications wants them regardless of whether a tool
        // catalog happens to be configured. The tool loop re-prompts the model
        // directly and has no notion of a `StreamSink`, so the two can't run
        // at once; a turn that needs both would have to stream the final
        // round only, which isn't something any caller asks for today.
        let (response_text, usage) = if request.stream && sink.is_some() {
            self.stream_turn(model_messages, &model_name, sink.unwrap()).await?
        } else if let Some(tools) = self.tools.as_ref().filter(|t| !t.is_empty()) {
            let outcome = tool_loop::run(&*self.model, tools, &model_name, model_messages, self.config.max_tool_iterations).await?;
            (outcome.final_text, outcome.usage)
        } else {
            let result = self
                .model
                .complete(CompletionRequest { messages: model_messages, model: model_name.clone(), max_tokens: None, temperature: None })
                .await?;
            (result.content, result.usage)
        };

        let token_usage = TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            model: model_name,
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = ledger.record(token_usage.clone(), None) {
            tracing::warn!(error = %e, "failed to record token usage");
        }

        history.add("assistant", &response_text, usage.output_tokens);

        Ok(TurnOutcome { response: response_text, usage: token_usage })
    }

    async fn retrieval_query(&self, message: &str, history: &dyn History) -> String {
        let Some(extractor) = &self.intent else {
            return message.to_string();
        };
        let context = recent_context_text(history);
        match extractor.extract(message, &context).await {
            Ok(intent) if !intent.query.trim().is_empty() => intent.query,
            Ok(_) => message.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "intent extraction failed, falling back to raw message");
                message.to_string()
            }
        }
    }

    fn rag_context(&self, query: &str) -> Option<String> {
        let router = self.index_router.as_ref()?;
        let index = router.active()?;
        let retrieval = broker_rag::Retrieval::new(index);
        Some(retrieval.get_context_for_query(query, self.config.max_rag_tokens, self.config.max_rag_chunks))
    }

    async fn stream_turn(
        &self,
        messages: Vec<Message>,
        model_name: &str,
        sink: &dyn StreamSink,
    ) -> anyhow::Result<(String, broker_model::Usage)> {
        let request = CompletionRequest { messages, model: model_name.to_string(), max_tokens: None, temperature: None };
        let mut stream = self.model.stream(request).await?;
        let mut full_text = String::new();
        let mut usage = broker_model::Usage::default();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => {
                    sink.chunk(&delta).await;
                    full_text.push_str(&delta);
                }
                ResponseEvent::Usage(u) => usage = u,
                ResponseEvent::Done => break,
                ResponseEvent::Error(message) => {
                    tracing::warn!(error = %message, "model stream reported an error");
                }
            }
        }

        let token_usage =
            TokenUsage { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens, model: model_name.to_string(), timestamp: chrono::Utc::now() };
        sink.done(Some(&token_usage)).await;

        Ok((full_text, usage))
    }
}

fn to_model_message(m: &broker_context::OutputMessage) -> Message {
    let role = match m.role.as_str() {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    };
    Message { role, content: m.content.clone() }
}

fn recent_context_text(history: &dyn History) -> String {
    history
        .recent(5)
        .iter()
        .map(|m: &HistoryMessage| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::{MockProvider, MockTurn, Usage};

    fn ledger() -> (broker_memory::Store, TokenLedger) {
        let store = broker_memory::Store::open_in_memory().unwrap();
        let session = store.sessions().create(None, None, None).unwrap();
        let ledger = TokenLedger::new(session.id, store.raw_connection(), None);
        (store, ledger)
    }

    #[tokio::test]
    async fn basic_turn_persists_history_and_records_usage() {
        let provider = Arc::new(MockProvider::new("m"));
        provider.push(MockTurn::new("hello", Usage { input_tokens: 3, output_tokens: 2 }));
        let engine = TurnEngine::new(provider, None, None, None, TurnConfig::default());
        let history = EphemeralHistory::new();
        let (_store, ledger) = ledger();

        let outcome = engine
            .run("s1", &history, &ledger, TurnRequest { message: "hi".into(), use_rag: false, stream: false }, None, None)
            .await
            .unwrap();

        assert_eq!(outcome.response, "hello");
        assert_eq!(outcome.usage.total(), 5);
        let all = history.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].role, "user");
        assert_eq!(all[1].role, "assistant");
        assert_eq!(ledger.get_session_stats().unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn streaming_turn_emits_chunks_in_order_then_done() {
        use std::sync::Mutex;

        struct RecordingSink {
            chunks: Mutex<Vec<String>>,
            done_called: Mutex<bool>,
        }

        #[async_trait::async_trait]
        impl StreamSink for RecordingSink {
            async fn chunk(&self, text: &str) {
                self.chunks.lock().unwrap().push(text.to_string());
            }
            async fn done(&self, _usage: Option<&TokenUsage>) {
                *self.done_called.lock().unwrap() = true;
            }
        }

        let provider = Arc::new(MockProvider::new("m"));
        provider.push(MockTurn::new("Hello!", Usage { input_tokens: 1, output_tokens: 1 }).with_chunks(vec!["Hel", "lo", "!"]));
        let engine = TurnEngine::new(provider, None, None, None, TurnConfig::default());
        let history = EphemeralHistory::new();
        let (_store, ledger) = ledger();
        let sink = RecordingSink { chunks: Mutex::new(Vec::new()), done_called: Mutex::new(false) };

        let outcome = engine
            .run("s1", &history, &ledger, TurnRequest { message: "hi".into(), use_rag: false, stream: true }, None, Some(&sink))
            .await
            .unwrap();

        assert_eq!(outcome.response, "Hello!");
        assert_eq!(*sink.chunks.lock().unwrap(), vec!["Hel", "lo", "!"]);
        assert!(*sink.done_called.lock().unwrap());
    }
}
