//! `model.set` needs to change which model a provider reports and targets at
//! runtime. `ModelProvider::model_name` returns an owned `String` for
//! exactly this reason, so the override here is a plain `Mutex<String>`
//! rather than anything more exotic.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use broker_model::{CompletionRequest, CompletionResult, ModelProvider, ResponseStream};

/// A [`ModelProvider`] whose reported (and requested) model identifier can be
/// changed at runtime. `complete`/`stream` delegate to `inner`, with the
/// request's `model` field rewritten to the active override first; in-flight
/// requests keep whatever model they were built with.
pub struct SwitchableModel {
    inner: Arc<dyn ModelProvider>,
    active: Mutex<String>,
}

impl SwitchableModel {
    pub fn new(inner: Arc<dyn ModelProvider>) -> Self {
        let active = inner.model_name();
        Self { inner, active: Mutex::new(active) }
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.active.lock().unwrap() = model.into();
    }
}

#[async_trait]
impl ModelProvider for SwitchableModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model_name(&self) -> String {
        self.active.lock().unwrap().clone()
    }

    async fn complete(&self, mut req: CompletionRequest) -> anyhow::Result<CompletionResult> {
        req.model = self.model_name();
        self.inner.complete(req).await
    }

    async fn stream(&self, mut req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        req.model = self.model_name();
        self.inner.stream(req).await
    }

    async fn list_models(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::MockProvider;

    #[test]
    fn reports_overridden_model_after_set() {
        let inner = Arc::new(MockProvider::new("gpt-4o-mini"));
        let switchable = SwitchableModel::new(inner);
        assert_eq!(switchable.model_name(), "gpt-4o-mini");
        switchable.set_model("gpt-4o");
        assert_eq!(switchable.model_name(), "gpt-4o");
    }

    #[tokio::test]
    async fn complete_delegates_to_inner_provider() {
        use broker_model::{Message, Usage};
        let inner = Arc::new(MockProvider::new("gpt-4o-mini"));
        inner.push(broker_model::MockTurn::new("hi there", Usage { input_tokens: 1, output_tokens: 2 }));
        let switchable = SwitchableModel::new(inner);
        switchable.set_model("gpt-4o");
        let result = switchable
            .complete(CompletionRequest { messages: vec![Message::user("hi")], model: "ignored".into(), max_tokens: None, temperature: None })
            .await
            .unwrap();
        assert_eq!(result.content, "hi there");
    }
}
