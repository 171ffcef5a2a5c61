//! Assembles the set of messages handed to the model for one turn, filling
//! a fixed token budget in priority order: system prompt, RAG context,
//! conversation summary, as many recent messages as fit, then the new user
//! message.

use std::collections::HashMap;
use std::sync::Mutex;

/// A role-tagged message as seen by the context builder. Deliberately
/// independent of any particular storage or model crate's message type —
/// callers adapt their own message shape into this one.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub token_count: u32,
}

impl HistoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>, token_count: u32) -> Self {
        Self { role: role.into(), content: content.into(), token_count }
    }
}

/// A message ready to hand to a [`broker_model`]-style provider, without
/// this crate needing to depend on that crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    pub max_tokens: u32,
    pub reserved_for_response: u32,
    pub recent_messages: usize,
    pub always_include_system: bool,
    pub summarize_after: usize,
    pub summary_max_tokens: u32,
    pub max_rag_tokens: u32,
    pub max_rag_chunks: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            reserved_for_response: 1000,
            recent_messages: 20,
            always_include_system: true,
            summarize_after: 30,
            summary_max_tokens: 500,
            max_rag_tokens: 2000,
            max_rag_chunks: 5,
        }
    }
}

impl ContextConfig {
    /// Tokens available for context, excluding the reserve held back for
    /// the model's own response.
    pub fn available_for_context(&self) -> u32 {
        self.max_tokens.saturating_sub(self.reserved_for_response)
    }
}

/// The assembled result of [`ContextManager::build`] or `build_simple`.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub messages: Vec<OutputMessage>,
    pub total_tokens: u32,
    pub included_message_count: usize,
    pub truncated: bool,
    pub has_summary: bool,
    pub rag_chunks_used: usize,
}

impl ContextWindow {
    pub fn to_llm_format(&self) -> &[OutputMessage] {
        &self.messages
    }
}

/// Estimates token count for text with a coarse ~4-characters-per-token
/// heuristic. Not model-specific; good enough for budgeting, not billing.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32 + 1
}

/// Builds context windows for LLM calls, caching a per-session summary
/// across calls until invalidated.
pub struct ContextManager {
    config: ContextConfig,
    summary_cache: Mutex<HashMap<String, String>>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self { config, summary_cache: Mutex::new(HashMap::new()) }
    }

    /// Full priority-ordered build: system prompt, RAG context, summary (if
    /// the session has grown past `summarize_after` messages and a summary
    /// is cached), as many recent messages as fit, then the user message.
    ///
    /// `all_messages` is the session's complete history (used only to
    /// decide whether summarization applies); `recent` is the already
    /// limited `recent_messages`-sized slice, oldest first.
    pub fn build(
        &self,
        session_id: &str,
        all_messages: &[HistoryMessage],
        recent: &[HistoryMessage],
        user_message: &str,
        system_prompt: Option<&str>,
        rag_context: Option<&str>,
    ) -> ContextWindow {
        let mut messages = Vec::new();
        let mut total_tokens = 0u32;
        let budget = self.config.available_for_context();

        if let Some(system_prompt) = system_prompt {
            total_tokens += estimate_tokens(system_prompt);
            messages.push(OutputMessage { role: "system".into(), content: system_prompt.to_string() });
        }

        let mut rag_chunks_used = 0;
        if let Some(rag_context) = rag_context {
            let rag_tokens = estimate_tokens(rag_context).min(self.config.max_rag_tokens);
            if total_tokens + rag_tokens < budget {
                let rag_message = format!("Relevant context from codebase:\n\n{rag_context}");
                messages.push(OutputMessage { role: "system".into(), content: rag_message });
                total_tokens += rag_tokens;
                rag_chunks_used = rag_context.matches("---").count() + 1;
            }
        }

        let mut has_summary = false;
        if all_messages.len() > self.config.summarize_after {
            if let Some(summary) = self.cached_summary(session_id) {
                let summary_tokens = estimate_tokens(&summary);
                if total_tokens + summary_tokens < budget {
                    messages.push(OutputMessage {
                        role: "system".into(),
                        content: format!("Summary of earlier conversation:\n{summary}"),
                    });
                    total_tokens += summary_tokens;
                    has_summary = true;
                }
            }
        }

        let user_tokens = estimate_tokens(user_message);
        let mut remaining_budget = (budget as i64) - (total_tokens as i64) - (user_tokens as i64);
        let mut included_count = 0;
        let mut truncated = false;
        let mut recent_out = Vec::new();

        for msg in recent {
            let msg_tokens = if msg.token_count > 0 { msg.token_count } else { estimate_tokens(&msg.content) };
            if remaining_budget >= msg_tokens as i64 {
                recent_out.push(OutputMessage { role: msg.role.clone(), content: msg.content.clone() });
                remaining_budget -= msg_tokens as i64;
                total_tokens += msg_tokens;
                included_count += 1;
            } else {
                truncated = true;
                break;
            }
        }
        messages.extend(recent_out);

        messages.push(OutputMessage { role: "user".into(), content: user_message.to_string() });
        total_tokens += user_tokens;
        included_count += 1;

        ContextWindow { messages, total_tokens, included_message_count: included_count, truncated, has_summary, rag_chunks_used }
    }

    /// Simpler interface: keeps as many of `messages` (newest-first
    /// semantics internally, returned oldest-first) as fit a flat budget.
    /// Unlike [`Self::build`], the inclusion test here is `<=` (inclusive of
    /// a message landing exactly on the budget), and a system message that
    /// doesn't fit is still kept when `always_include_system` is set.
    pub fn build_simple(&self, messages: &[HistoryMessage], max_tokens: Option<u32>) -> ContextWindow {
        let budget = max_tokens.unwrap_or_else(|| self.config.available_for_context());
        let mut result: Vec<OutputMessage> = Vec::new();
        let mut total_tokens = 0u32;

        for msg in messages.iter().rev() {
            let msg_tokens = if msg.token_count > 0 { msg.token_count } else { estimate_tokens(&msg.content) };
            if total_tokens + msg_tokens <= budget {
                result.insert(0, OutputMessage { role: msg.role.clone(), content: msg.content.clone() });
                total_tokens += msg_tokens;
            } else if msg.role == "system" && self.config.always_include_system {
                result.insert(0, OutputMessage { role: msg.role.clone(), content: msg.content.clone() });
                total_tokens += msg_tokens;
            } else {
                break;
            }
        }

        let truncated = result.len() < messages.len();
        ContextWindow {
            included_message_count: result.len(),
            messages: result,
            total_tokens,
            truncated,
            has_summary: false,
            rag_chunks_used: 0,
        }
    }

    pub fn should_summarize(&self, message_count: usize) -> bool {
        message_count > self.config.summarize_after
    }

    pub fn invalidate_summary(&self, session_id: &str) {
        self.summary_cache.lock().unwrap().remove(session_id);
    }

    /// Sets the cached summary for a session, to be called once an async
    /// summarization pass completes. Real summarization (the LLM call that
    /// produces the text) lives outside this crate.
    pub fn set_summary(&self, session_id: &str, summary: impl Into<String>) {
        self.summary_cache.lock().unwrap().insert(session_id.to_string(), summary.into());
    }

    fn cached_summary(&self, session_id: &str) -> Option<String> {
        self.summary_cache.lock().unwrap().get(session_id).cloned()
    }
}
