//! Client facade: retry and fallback orchestration over the provider
//! contract.
//!
//! Each public operation is one logical call chain. The inner retry policy
//! re-attempts the same provider on transient errors; the outer fallback
//! policy walks alternate providers when the bound one fails persistently.
//! Health probing bypasses both policies so it reflects true instantaneous
//! state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::registry::{ClientConfig, Registry, normalize_name};
use crate::traits::Provider;
use crate::types::{
    CompletionResponse, ContextItem, HealthStatus, ModelInfo, ProviderOptions, RequestOptions,
};

/// Option keys stripped from introspection output, matched case-insensitively
/// as substrings of the key name.
const SENSITIVE_OPTION_KEYS: [&str; 4] = ["api_key", "password", "token", "secret"];

type OpFuture<T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send>>;

/// Sanitized introspection snapshot of the bound provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub backend: String,
    pub available: bool,
    pub options: serde_json::Map<String, Value>,
}

/// Unified client bound to one named provider, with retry and fallback
/// driven by the registry's policy.
pub struct Client {
    registry: Arc<Registry>,
    provider_name: String,
    provider: Arc<dyn Provider>,
    fallback_enabled: bool,
}

impl Client {
    /// Bind the registry's default provider.
    pub fn new(registry: Arc<Registry>) -> Result<Self, ProviderError> {
        let name = registry.config().default_provider;
        Self::with_provider(registry, &name)
    }

    /// Bind a specific registered provider.
    pub fn with_provider(registry: Arc<Registry>, name: &str) -> Result<Self, ProviderError> {
        let provider = registry.provider(name)?;
        Ok(Self {
            registry,
            provider_name: normalize_name(name),
            provider,
            fallback_enabled: true,
        })
    }

    /// Disable the fallback policy: only the bound provider is attempted.
    pub fn without_fallback(mut self) -> Self {
        self.fallback_enabled = false;
        self
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Generate an embedding, retrying transient failures and falling back
    /// across providers per the configured policy.
    pub async fn generate_embedding(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<Vec<f32>, ProviderError> {
        let text = text.to_string();
        let options = options.clone();
        self.run_with_policies(move |provider| {
            let text = text.clone();
            let options = options.clone();
            Box::pin(async move { provider.generate_embedding(&text, &options).await })
        })
        .await
    }

    /// Generate a completion, retrying transient failures and falling back
    /// across providers per the configured policy. The prompt, context items
    /// and options travel unchanged to every candidate.
    pub async fn generate_response(
        &self,
        prompt: &str,
        context: &[ContextItem],
        options: &RequestOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let prompt = prompt.to_string();
        let context = context.to_vec();
        let options = options.clone();
        self.run_with_policies(move |provider| {
            let prompt = prompt.clone();
            let context = context.clone();
            let options = options.clone();
            Box::pin(async move { provider.generate_response(&prompt, &context, &options).await })
        })
        .await
    }

    /// Direct health probe of the bound provider. No retry, no fallback.
    pub async fn health_check(&self) -> HealthStatus {
        self.provider.health_check().await
    }

    /// Direct availability probe of the bound provider.
    pub async fn available(&self) -> bool {
        self.provider.available().await
    }

    /// Introspection snapshot of the bound provider. Credential-bearing
    /// option keys are stripped.
    pub async fn provider_info(&self) -> ProviderInfo {
        let options = self
            .registry
            .registration(&self.provider_name)
            .map(|(_, options)| sanitize_options(&options))
            .unwrap_or_default();
        ProviderInfo {
            name: self.provider_name.clone(),
            backend: self.provider.backend().to_string(),
            available: self.provider.available().await,
            options,
        }
    }

    /// Forwarded model listing, for backends that manage local models.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        match self.provider.model_management() {
            Some(models) => models.list_models().await,
            None => Err(self.unsupported("list_models")),
        }
    }

    /// Forwarded model pull, for backends that manage local models.
    pub async fn pull_model(&self, model: &str) -> Result<(), ProviderError> {
        match self.provider.model_management() {
            Some(models) => models.pull_model(model).await,
            None => Err(self.unsupported("pull_model")),
        }
    }

    fn unsupported(&self, operation: &str) -> ProviderError {
        ProviderError::Provider(format!(
            "provider '{}' does not support {operation}",
            self.provider_name
        ))
    }

    async fn run_with_policies<T, F>(&self, operation: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn Provider>) -> OpFuture<T>,
    {
        let config = self.registry.config();

        if !self.fallback_enabled {
            return self
                .run_with_retry(self.provider.clone(), &self.provider_name, &config, &operation)
                .await;
        }

        let mut last_error: Option<ProviderError> = None;
        let mut attempted = false;

        for name in self.candidates(&config).await {
            let provider = if name == self.provider_name {
                self.provider.clone()
            } else {
                match self.registry.provider(&name) {
                    Ok(provider) => provider,
                    Err(err) => {
                        warn!(provider = %name, error = %err, "candidate could not be constructed");
                        continue;
                    }
                }
            };

            if !provider.available().await {
                debug!(provider = %name, "skipping unavailable candidate");
                continue;
            }

            attempted = true;
            match self.run_with_retry(provider, &name, &config, &operation).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(provider = %name, error = %err, "candidate failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        if attempted {
            Err(last_error
                .unwrap_or_else(|| ProviderError::Provider("no available providers".to_string())))
        } else {
            Err(ProviderError::Provider(
                "no available providers".to_string(),
            ))
        }
    }

    /// Ordered fallback candidates: the bound provider first, then the
    /// configured fallback order, or every currently-available registered
    /// provider when no explicit order exists.
    async fn candidates(&self, config: &ClientConfig) -> Vec<String> {
        let mut list = vec![self.provider_name.clone()];
        if config.fallback_providers.is_empty() {
            for name in self.registry.available_providers().await {
                if name != self.provider_name {
                    list.push(name);
                }
            }
        } else {
            for name in &config.fallback_providers {
                let name = normalize_name(name);
                if name != self.provider_name {
                    list.push(name);
                }
            }
        }
        list
    }

    /// Retry policy for a single provider: linear backoff on rate limiting,
    /// flat delay on connection errors, immediate propagation otherwise.
    /// `retry_attempts` counts total attempts including the first.
    async fn run_with_retry<T, F>(
        &self,
        provider: Arc<dyn Provider>,
        name: &str,
        config: &ClientConfig,
        operation: &F,
    ) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn Provider>) -> OpFuture<T>,
    {
        let max_attempts = config.retry_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match operation(provider.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() || attempt >= max_attempts {
                        return Err(err);
                    }
                    let delay = match &err {
                        ProviderError::RateLimit(_) => config.retry_delay.mul_f64(attempt as f64),
                        _ => config.retry_delay,
                    };
                    debug!(
                        provider = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Strip credential-bearing keys from an options map.
fn sanitize_options(options: &ProviderOptions) -> serde_json::Map<String, Value> {
    options
        .iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            !SENSITIVE_OPTION_KEYS
                .iter()
                .any(|sensitive| key.contains(sensitive))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_credential_keys() {
        let options = ProviderOptions::new()
            .with("base_url", "http://localhost")
            .with("api_key", "sk-secret")
            .with("API_KEY", "sk-secret")
            .with("openai_api_key", "sk-secret")
            .with("password", "hunter2")
            .with("auth_token", "t")
            .with("client_secret", "s")
            .with("model", "llama3.1");
        let sanitized = sanitize_options(&options);
        let keys: Vec<&String> = sanitized.keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(sanitized.contains_key("base_url"));
        assert!(sanitized.contains_key("model"));
    }

    #[test]
    fn sanitize_keeps_everything_else() {
        let options = ProviderOptions::new()
            .with("timeout", 5)
            .with("embedding_dimension", 768);
        assert_eq!(sanitize_options(&options).len(), 2);
    }
}
