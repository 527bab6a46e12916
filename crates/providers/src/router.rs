//! Provider router — selects the correct LLM provider based on config.
//!
//! Handles provider creation and lookup, and assembles the fallback chains
//! used for builds (one summarizer per backend) and for query-time
//! generation (one [`FallbackProvider`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use recap_config::AppConfig;
use recap_core::provider::Provider;
use recap_core::summarizer::Summarizer;

use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::summarizer::ProviderSummarizer;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// One resolved backend: a provider plus the model to ask it for.
#[derive(Clone)]
pub struct Backend {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl Backend {
    /// `provider/model`, for logs and progress output.
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider.name(), self.model)
    }
}

/// Build providers from configuration.
///
/// Every `[providers.*]` entry is registered, plus the default provider and
/// any provider named only in `[[fallbacks]]`, using well-known base URLs.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let timeout = Duration::from_secs(config.retry.timeout_secs);
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::with_timeout(name, &base_url, &api_key, timeout)),
        );
    }

    // Ensure the default and fallback providers exist even if not explicitly configured
    let implicit = std::iter::once(config.default_provider.as_str())
        .chain(config.fallbacks.iter().map(|f| f.provider.as_str()));
    for name in implicit {
        if router.get(name).is_none() {
            let api_key = config.api_key.clone().unwrap_or_default();
            router.register(
                name,
                Arc::new(OpenAiCompatProvider::with_timeout(
                    name,
                    default_base_url(name),
                    api_key,
                    timeout,
                )),
            );
        }
    }

    router
}

/// The default backend followed by every configured fallback, in order.
pub fn backend_chain(config: &AppConfig, router: &ProviderRouter) -> Vec<Backend> {
    let primary = router.default_provider().map(|provider| Backend {
        model: model_for(config, &config.default_provider, None),
        provider,
    });

    let fallbacks = config.fallbacks.iter().filter_map(|f| {
        router.get(&f.provider).map(|provider| Backend {
            model: model_for(config, &f.provider, f.model.as_deref()),
            provider,
        })
    });

    primary.into_iter().chain(fallbacks).collect()
}

/// One [`ProviderSummarizer`] per backend, primary first.
pub fn summarizer_chain(config: &AppConfig, router: &ProviderRouter) -> Vec<Arc<dyn Summarizer>> {
    backend_chain(config, router)
        .into_iter()
        .map(|backend| {
            Arc::new(ProviderSummarizer::from_config(
                backend.provider,
                backend.model,
                config,
            )) as Arc<dyn Summarizer>
        })
        .collect()
}

/// A single provider that walks the whole backend chain on failure.
///
/// The returned provider's requests carry the primary model; each entry is
/// pinned to its own model so fallbacks can use cheaper ones.
pub fn fallback_provider(config: &AppConfig, router: &ProviderRouter) -> FallbackProvider {
    let timeout = Duration::from_secs(config.retry.timeout_secs);
    backend_chain(config, router)
        .into_iter()
        .fold(FallbackProvider::new("fallback"), |chain, backend| {
            chain.add_pinned(backend.provider, backend.model, timeout)
        })
}

/// Model for `provider`: explicit override, then the provider's own
/// default, then the global default.
fn model_for(config: &AppConfig, provider: &str, explicit: Option<&str>) -> String {
    explicit
        .map(String::from)
        .or_else(|| {
            config
                .providers
                .get(provider)
                .and_then(|p| p.default_model.clone())
        })
        .unwrap_or_else(|| config.default_model.clone())
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
