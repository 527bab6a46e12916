//! Summarizers backed by providers.
//!
//! [`ProviderSummarizer`] turns a [`Provider`] into the [`Summarizer`] the
//! tree builder is driven by: each [`SystemRole`] maps to its own system
//! prompt. [`SwappableSummarizer`] lets the backend change while a build is
//! running.

use std::sync::Arc;

use async_trait::async_trait;
use recap_config::{AppConfig, PromptConfig};
use recap_core::error::ProviderError;
use recap_core::provider::{Provider, ProviderRequest};
use recap_core::summarizer::{Summarizer, SystemRole};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// System prompts for the three summarization roles.
#[derive(Debug, Clone)]
pub struct RolePrompts {
    pub leaf: String,
    pub intermediate: String,
    pub final_synthesis: String,
}

impl RolePrompts {
    pub fn for_role(&self, role: SystemRole) -> &str {
        match role {
            SystemRole::Leaf => &self.leaf,
            SystemRole::Intermediate => &self.intermediate,
            SystemRole::Final => &self.final_synthesis,
        }
    }
}

impl From<&PromptConfig> for RolePrompts {
    fn from(prompts: &PromptConfig) -> Self {
        Self {
            leaf: prompts.leaf.clone(),
            intermediate: prompts.intermediate.clone(),
            final_synthesis: prompts.final_synthesis.clone(),
        }
    }
}

impl Default for RolePrompts {
    fn default() -> Self {
        Self::from(&PromptConfig::default())
    }
}

/// Summarizes through one provider and model.
pub struct ProviderSummarizer {
    label: String,
    provider: Arc<dyn Provider>,
    model: String,
    prompts: RolePrompts,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            label: format!("{}/{}", provider.name(), model),
            provider,
            model,
            prompts: RolePrompts::default(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Prompts, temperature and token limit taken from `config`.
    pub fn from_config(provider: Arc<dyn Provider>, model: impl Into<String>, config: &AppConfig) -> Self {
        Self::new(provider, model)
            .with_prompts(RolePrompts::from(&config.prompts))
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
    }

    pub fn with_prompts(mut self, prompts: RolePrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    fn name(&self) -> &str {
        &self.label
    }

    async fn summarize(&self, text: &str, role: SystemRole) -> Result<String, ProviderError> {
        let mut request = ProviderRequest::exchange(&self.model, self.prompts.for_role(role), text)
            .with_temperature(self.temperature);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                summarizer = %self.label,
                %role,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Summarized"
            );
        }
        Ok(response.message.content.trim().to_string())
    }
}

/// A summarizer whose backend can be replaced at any time.
///
/// Calls already in flight finish on the backend they started with; every
/// call made after [`swap`](Self::swap) returns uses the new one.
pub struct SwappableSummarizer {
    name: String,
    inner: RwLock<Arc<dyn Summarizer>>,
}

impl SwappableSummarizer {
    pub fn new(initial: Arc<dyn Summarizer>) -> Self {
        Self::named("swappable", initial)
    }

    /// A slot reported under `name` whatever backend currently fills it.
    pub fn named(name: impl Into<String>, initial: Arc<dyn Summarizer>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(initial),
        }
    }

    /// Replace the backend, returning the previous one.
    pub async fn swap(&self, next: Arc<dyn Summarizer>) -> Arc<dyn Summarizer> {
        let mut guard = self.inner.write().await;
        info!(from = guard.name(), to = next.name(), "Switching summarizer backend");
        std::mem::replace(&mut *guard, next)
    }

    /// The backend new calls currently go to.
    pub async fn current(&self) -> Arc<dyn Summarizer> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl Summarizer for SwappableSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize(&self, text: &str, role: SystemRole) -> Result<String, ProviderError> {
        let current = self.current().await;
        current.summarize(text, role).await
    }

    async fn reduce(&self, contents: &[String], role: SystemRole) -> Result<String, ProviderError> {
        let current = self.current().await;
        current.reduce(contents, role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::message::{Message, Role};
    use recap_core::provider::{ProviderResponse, Usage};
    use std::sync::Mutex;

    /// Records requests and answers with a canned reply.
    struct CannedProvider {
        reply: String,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ProviderResponse {
                message: Message::assistant(format!("  {}\n", self.reply)),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 2,
                    total_tokens: 12,
                }),
                model: request.model,
            })
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Summarizer for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn summarize(&self, _text: &str, _role: SystemRole) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn role_selects_the_system_prompt() {
        let provider = Arc::new(CannedProvider::new("- the boat rocks"));
        let prompts = RolePrompts {
            leaf: "LEAF".into(),
            intermediate: "MID".into(),
            final_synthesis: "FINAL".into(),
        };
        let summarizer = ProviderSummarizer::new(provider.clone(), "gpt-4o-mini")
            .with_prompts(prompts)
            .with_max_tokens(200);

        let out = summarizer.summarize("passage", SystemRole::Leaf).await.unwrap();
        assert_eq!(out, "- the boat rocks");
        summarizer
            .reduce(&["a".into(), "b".into()], SystemRole::Final)
            .await
            .unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert_eq!(requests[0].max_tokens, Some(200));
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, "LEAF");
        assert_eq!(requests[0].messages[1].content, "passage");
        assert_eq!(requests[1].messages[0].content, "FINAL");
        assert_eq!(requests[1].messages[1].content, "a\nb");
    }

    #[test]
    fn summarizer_name_includes_model() {
        let s = ProviderSummarizer::new(Arc::new(CannedProvider::new("x")), "llama3");
        assert_eq!(s.name(), "canned/llama3");
        assert_eq!(s.model(), "llama3");
    }

    #[test]
    fn prompts_come_from_config() {
        let mut config = AppConfig::default();
        config.prompts.intermediate = "custom merge".into();
        let prompts = RolePrompts::from(&config.prompts);
        assert_eq!(prompts.for_role(SystemRole::Intermediate), "custom merge");
        assert_eq!(prompts.for_role(SystemRole::Leaf), config.prompts.leaf);
    }

    #[tokio::test]
    async fn swap_redirects_later_calls() {
        let swappable = SwappableSummarizer::new(Arc::new(Fixed("gpt-4")));
        assert_eq!(
            swappable.summarize("t", SystemRole::Leaf).await.unwrap(),
            "gpt-4"
        );

        let previous = swappable.swap(Arc::new(Fixed("local"))).await;
        assert_eq!(previous.name(), "gpt-4");
        assert_eq!(
            swappable.summarize("t", SystemRole::Leaf).await.unwrap(),
            "local"
        );
        assert_eq!(swappable.current().await.name(), "local");
        assert_eq!(swappable.name(), "swappable");
    }

    #[tokio::test]
    async fn named_slot_keeps_its_name_across_swaps() {
        let slot = SwappableSummarizer::named("primary", Arc::new(Fixed("gpt-4")));
        slot.swap(Arc::new(Fixed("local"))).await;
        assert_eq!(slot.name(), "primary");
        assert_eq!(slot.summarize("t", SystemRole::Final).await.unwrap(), "local");
    }
}
