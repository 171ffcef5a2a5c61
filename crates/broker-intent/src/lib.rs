//! Best-effort intent extraction: one LLM call that turns a user message
//! into a structured intent (kind, entities, a reformulated retrieval
//! query, a freeform reasoning trace). Never fatal to a turn — callers
//! treat a failure here as "no intent" and fall back to the raw message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use broker_model::{CompletionRequest, Message, ModelProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Research,
    Organize,
    Control,
}

impl IntentKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "organize" => IntentKind::Organize,
            "control" => IntentKind::Control,
            _ => IntentKind::Research,
        }
    }
}

/// The structured result of intent extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: Vec<String>,
    pub action: String,
    pub query: String,
    pub reasoning: String,
    pub confidence: f32,
}

impl Intent {
    /// Builds an `Intent` from the model's JSON output, normalizing
    /// whatever shape `entities` arrived in (a list, or a comma-joined
    /// string) and defaulting an unrecognized `intent_type` to research.
    pub fn from_json(value: &Value) -> Self {
        let kind = value.get("intent_type").and_then(Value::as_str).map(IntentKind::parse).unwrap_or(IntentKind::Research);

        let entities = match value.get("entities") {
            Some(Value::Array(items)) => {
                items.iter().filter_map(Value::as_str).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
            }
            Some(Value::String(s)) => s.split(',').map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect(),
            _ => Vec::new(),
        };

        Self {
            kind,
            entities,
            action: value.get("action").and_then(Value::as_str).unwrap_or("search").to_string(),
            query: value.get("query").and_then(Value::as_str).unwrap_or("").to_string(),
            reasoning: value.get("reasoning").and_then(Value::as_str).unwrap_or("").to_string(),
            confidence: value.get("confidence").and_then(Value::as_f64).map(|c| c as f32).unwrap_or(1.0),
        }
    }
}

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, message: &str, context: &str) -> anyhow::Result<Intent>;
}

/// Extracts intent with one non-streaming call to a [`ModelProvider`],
/// prompting for a JSON object and parsing whatever JSON substring the
/// response contains.
pub struct ModelIntentExtractor {
    provider: Arc<dyn ModelProvider>,
}

impl ModelIntentExtractor {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl IntentExtractor for ModelIntentExtractor {
    async fn extract(&self, message: &str, context: &str) -> anyhow::Result<Intent> {
        let prompt = format!(
            "Classify the user's message into a structured intent.\n\
             Respond with a single JSON object with keys: intent_type (one of \
             research, organize, control), entities (comma-separated key terms), \
             action (one of search, clarify, answer, execute), query (a \
             reformulated search query, empty if action is not search), and \
             reasoning (a short explanation).\n\n\
             Previous conversation context:\n{context}\n\n\
             User message: {message}"
        );
        let request = CompletionRequest {
            messages: vec![Message::user(prompt)],
            model: self.provider.model_name().to_string(),
            max_tokens: Some(300),
            temperature: Some(0.0),
        };
        let result = self.provider.complete(request).await?;
        let json = extract_json_object(&result.content)
            .ok_or_else(|| anyhow::anyhow!("intent extractor response did not contain a JSON object"))?;
        let value: Value = serde_json::from_str(&json)?;
        Ok(Intent::from_json(&value))
    }
}

/// Pulls the substring from the first `{` to the last `}` and returns it,
/// on the expectation that the model wraps its JSON in prose or fencing.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}
