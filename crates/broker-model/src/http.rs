use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::provider::{ModelProvider, ResponseStream};
use crate::types::{CompletionRequest, CompletionResult, ResponseEvent, Role, Usage};

/// Adapter for any OpenAI-compatible `/chat/completions` endpoint. The exact
/// wire protocol of the upstream model is out of scope here; this only
/// covers enough of the common surface (messages, non-streaming and SSE
/// streaming responses, token usage) to drive the rest of the system.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key, model: model.into() }
    }

    fn request_builder(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut builder = self.client.post(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn wire_messages(req: &CompletionRequest) -> Vec<WireMessage> {
        req.messages
            .iter()
            .map(|m| WireMessage { role: m.role.as_str().to_string(), content: m.content.clone() })
            .collect()
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessageOut,
}

#[derive(Deserialize)]
struct WireMessageOut {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResult> {
        let body = json!({
            "model": req.model,
            "messages": Self::wire_messages(&req),
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "stream": false,
        });
        let resp: ChatCompletionResponse =
            self.request_builder("/chat/completions").json(&body).send().await?.error_for_status()?.json().await?;
        let content = resp.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default();
        let usage = resp.usage.unwrap_or_default();
        Ok(CompletionResult {
            content,
            usage: Usage { input_tokens: usage.prompt_tokens, output_tokens: usage.completion_tokens },
            model: resp.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let body = json!({
            "model": req.model,
            "messages": Self::wire_messages(&req),
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "stream": true,
        });
        let resp = self.request_builder("/chat/completions").json(&body).send().await?.error_for_status()?;
        let byte_stream = resp.bytes_stream();

        let events = byte_stream.flat_map(|chunk_result| {
            let lines: Vec<anyhow::Result<ResponseEvent>> = match chunk_result {
                Err(e) => vec![Err(e.into())],
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    text.lines().filter_map(parse_sse_line).collect()
                }
            };
            stream::iter(lines)
        });
        Ok(Box::pin(events))
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        #[derive(Deserialize)]
        struct ModelsResponse {
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.get(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp: ModelsResponse = builder.send().await?.error_for_status()?.json().await?;
        Ok(resp.data.into_iter().map(|m| m.id).collect())
    }
}

/// Parses one line of a `text/event-stream` body into a response event, if
/// the line carries one. Non-`data:` lines (blank keep-alives, `event:`
/// framing) are dropped silently.
fn parse_sse_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let payload = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => {
            if let Some(usage) = chunk.usage {
                return Some(Ok(ResponseEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                })));
            }
            let delta = chunk.choices.into_iter().next().and_then(|c| c.delta.content);
            delta.map(|d| Ok(ResponseEvent::TextDelta(d)))
        }
        Err(e) => Some(Err(anyhow::anyhow!("malformed stream chunk: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_delta_chunk() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        let event = parse_sse_line(line).unwrap().unwrap();
        assert!(matches!(event, ResponseEvent::TextDelta(t) if t == "Hi"));
    }

    #[test]
    fn recognizes_done_sentinel() {
        let event = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert!(matches!(event, ResponseEvent::Done));
    }

    #[test]
    fn ignores_blank_and_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line("event: ping").is_none());
    }

    #[test]
    fn extracts_usage_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#;
        let event = parse_sse_line(line).unwrap().unwrap();
        match event {
            ResponseEvent::Usage(u) => {
                assert_eq!(u.input_tokens, 10);
                assert_eq!(u.output_tokens, 4);
            }
            _ => panic!("expected usage event"),
        }
    }
}
