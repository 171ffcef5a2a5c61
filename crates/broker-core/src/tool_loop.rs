//! The tool-enabled re-prompt loop: after each model response, scan it for
//! a `{"tool": <name>, "args": {...}}` object; if present, execute the call
//! and feed the result back for another round. Bounded, and every exit path
//! restores the caller's original message list (the system-prompt
//! augmentation this module adds is local to its own working copy).

use serde_json::Value;

use broker_model::{CompletionRequest, Message, ModelProvider, Usage};
use broker_tools::{ToolCatalog, ToolResult};

#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Value,
    pub result: ToolResult,
}

pub struct ToolLoopOutcome {
    pub final_text: String,
    pub calls: Vec<ToolCallRecord>,
    pub hit_limit: bool,
    /// Summed across every model call this loop made, not just the final one.
    pub usage: Usage,
}

/// Runs the tool loop to completion or until `max_iterations` rounds have
/// executed a tool call. `messages` is the turn's base message list; a
/// tool-catalog description is appended to the system prompt for the
/// duration of this call only — the caller's own history is untouched.
pub async fn run(
    provider: &dyn ModelProvider,
    catalog: &ToolCatalog,
    model: &str,
    mut messages: Vec<Message>,
    max_iterations: u32,
) -> anyhow::Result<ToolLoopOutcome> {
    append_tool_catalog_note(&mut messages, catalog).await;

    let mut calls = Vec::new();
    let mut usage = Usage::default();
    for _ in 0..max_iterations {
        let request = CompletionRequest {
            messages: messages.clone(),
            model: model.to_string(),
            max_tokens: None,
            temperature: None,
        };
        let result = provider.complete(request).await?;
        usage.input_tokens += result.usage.input_tokens;
        usage.output_tokens += result.usage.output_tokens;
        let text = result.content;

        match extract_tool_call(&text) {
            Some((name, args)) => {
                messages.push(Message::assistant(&text));
                let outcome = catalog.call(&name, args.clone()).await;
                let result_text = match &outcome.error {
                    Some(message) => format!("Error: {message}"),
                    None => outcome.content.clone(),
                };
                messages.push(Message::user(format!("Tool result for {name}: {result_text}")));
                calls.push(ToolCallRecord { tool: name, args, result: outcome });
            }
            None => {
                return Ok(ToolLoopOutcome { final_text: text, calls, hit_limit: false, usage });
            }
        }
    }

    Ok(ToolLoopOutcome { final_text: limit_summary(&calls, max_iterations), calls, hit_limit: true, usage })
}

/// Pulls the substring from the first `{` to the last `}`, on the
/// expectation that this is the (possibly only) JSON object in the
/// response, and checks it decodes into an object carrying a `tool` key.
/// This mirrors a plain substring scan rather than a true balanced-brace
/// matcher — a JSON object embedded in surrounding prose parses correctly,
/// but a literal `}` inside a string value earlier in the text can still
/// confuse it.
fn extract_tool_call(text: &str) -> Option<(String, Value)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    let value: Value = serde_json::from_str(candidate).ok()?;
    let name = value.get("tool")?.as_str()?.to_string();
    let args = value.get("args").cloned().unwrap_or(Value::Object(Default::default()));
    Some((name, args))
}

async fn append_tool_catalog_note(messages: &mut Vec<Message>, catalog: &ToolCatalog) {
    let tools = catalog.to_llm_format().await;
    if tools.as_array().map(|a| a.is_empty()).unwrap_or(true) {
        return;
    }
    let note = format!(
        "\n\nYou may call a tool by responding with a JSON object of the form \
         {{\"tool\": <name>, \"args\": {{...}}}}. Available tools:\n{tools}"
    );
    if let Some(system) = messages.iter_mut().find(|m| m.role == broker_model::Role::System) {
        system.content.push_str(&note);
    } else {
        messages.insert(0, Message::system(note.trim_start()));
    }
}

fn limit_summary(calls: &[ToolCallRecord], max_iterations: u32) -> String {
    let mut summary = format!(
        "Reached the maximum tool-call budget ({max_iterations} rounds). Summary of calls made:\n"
    );
    for (i, call) in calls.iter().enumerate() {
        let outcome = if call.result.is_error { "error" } else { "ok" };
        summary.push_str(&format!("{}. {} -> {}\n", i + 1, call.tool, outcome));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::{MockProvider, MockTurn, Usage};
    use broker_tools::LocalTool;
    use std::sync::Arc;

    struct Noop;

    #[async_trait::async_trait]
    impl LocalTool for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn call(&self, _arguments: Value) -> ToolResult {
            ToolResult::ok(r#"{"ok":true}"#)
        }
    }

    fn catalog_with_noop() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog.register_local(Arc::new(Noop));
        catalog
    }

    #[tokio::test]
    async fn returns_text_unchanged_when_no_tool_call_is_present() {
        let provider = MockProvider::new("mock");
        provider.push(MockTurn::new("just a normal answer", Usage::default()));
        let catalog = catalog_with_noop();
        let outcome = run(&provider, &catalog, "mock", vec![Message::user("hi")], 10).await.unwrap();
        assert_eq!(outcome.final_text, "just a normal answer");
        assert!(outcome.calls.is_empty());
        assert!(!outcome.hit_limit);
    }

    #[tokio::test]
    async fn executes_a_tool_call_then_returns_the_next_turns_text() {
        let provider = MockProvider::new("mock");
        provider.push(MockTurn::new(r#"{"tool": "noop", "args": {}}"#, Usage::default()));
        provider.push(MockTurn::new("all done", Usage::default()));
        let catalog = catalog_with_noop();
        let outcome = run(&provider, &catalog, "mock", vec![Message::user("hi")], 10).await.unwrap();
        assert_eq!(outcome.final_text, "all done");
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].tool, "noop");
    }

    #[tokio::test]
    async fn caps_execution_count_at_max_iterations_and_summarizes() {
        let provider = MockProvider::new("mock");
        provider.push(MockTurn::new(r#"{"tool": "noop", "args": {}}"#, Usage::default()));
        let catalog = catalog_with_noop();
        let outcome = run(&provider, &catalog, "mock", vec![Message::user("hi")], 3).await.unwrap();
        assert_eq!(outcome.calls.len(), 3);
        assert!(outcome.hit_limit);
        assert!(outcome.final_text.contains("maximum"));
    }
}
