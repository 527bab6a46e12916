//! Provider fallback — ordered chain with per-entry deadlines.
//!
//! Query-time generation (summaries and quizzes) goes through this chain:
//! any error or an expired deadline moves on to the next entry, and the last
//! error is returned when every entry failed. Tree builds use the summarizer
//! chain in `recap_tree::TreeBuilder` instead, which also retries each entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recap_core::error::ProviderError;
use recap_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A provider that walks an ordered list of providers until one answers.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
}

struct FallbackEntry {
    provider: Arc<dyn Provider>,
    /// Replaces the request's model when set
    model: Option<String>,
    timeout: Duration,
}

impl FallbackEntry {
    fn request_for(&self, request: &ProviderRequest) -> ProviderRequest {
        let mut request = request.clone();
        if let Some(model) = &self.model {
            request.model = model.clone();
        }
        request
    }

    fn label(&self, request: &ProviderRequest) -> String {
        let model = self.model.as_deref().unwrap_or(&request.model);
        format!("{}/{}", self.provider.name(), model)
    }
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Append `provider`; it answers with whatever model the request names.
    pub fn add(self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.push(provider, None, timeout)
    }

    /// Append `provider`, always asking it for `model`.
    pub fn add_pinned(
        self,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.push(provider, Some(model.into()), timeout)
    }

    fn push(mut self, provider: Arc<dyn Provider>, model: Option<String>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            provider,
            model,
            timeout,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Run `call` against each entry in order until one succeeds.
    async fn walk<T, F, Fut>(&self, request: &ProviderRequest, call: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn Provider>, ProviderRequest) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = ProviderError::NotConfigured(format!(
            "Fallback chain '{}' has no providers",
            self.name
        ));

        for (i, entry) in self.chain.iter().enumerate() {
            let label = entry.label(request);
            debug!(backend = %label, position = i + 1, of = self.chain.len(), "Trying backend");

            let attempt = call(entry.provider.clone(), entry.request_for(request));
            last_error = match tokio::time::timeout(entry.timeout, attempt).await {
                Ok(Ok(value)) => {
                    if i > 0 {
                        warn!(backend = %label, "Served by fallback backend");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "{label} gave no answer within {}s",
                    entry.timeout.as_secs()
                )),
            };
            warn!(backend = %label, error = %last_error, "Backend failed, trying next");
        }

        Err(last_error)
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.walk(&request, |provider, request| async move {
            provider.complete(request).await
        })
        .await
    }

    /// Falls back only while opening the stream. Errors after the first
    /// chunk are delivered on the receiver.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.walk(&request, |provider, request| async move {
            provider.stream(request).await
        })
        .await
    }
}
