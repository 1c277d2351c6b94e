//! Provider contract implemented by every backend adapter.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{
    CompletionResponse, ContextItem, HealthStatus, ModelInfo, RequestOptions, SharedOptions,
};

/// The capability set every backend must satisfy. The retry and fallback
/// layers talk to backends exclusively through this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registered provider name this instance was constructed under.
    fn name(&self) -> &str;

    /// Backend type identifier ("ollama", "openai", ...).
    fn backend(&self) -> &'static str;

    /// Shared option keys parsed at construction (timeout, prompt templates,
    /// context configs).
    fn shared(&self) -> &SharedOptions;

    /// Generate an embedding vector for `text`.
    ///
    /// The result always has the backend's declared dimensionality; fails
    /// with [`ProviderError::InvalidResponse`] when the backend returns no
    /// usable vector.
    async fn generate_embedding(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<Vec<f32>, ProviderError>;

    /// Generate a text completion for `prompt`, optionally grounded in
    /// `context` items. Fails with [`ProviderError::InvalidResponse`] when no
    /// text is extractable from the backend payload.
    async fn generate_response(
        &self,
        prompt: &str,
        context: &[ContextItem],
        options: &RequestOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Probe the backend. Never fails: backend errors are folded into an
    /// unavailable status carrying the error kind and message.
    async fn health_check(&self) -> HealthStatus;

    /// True iff the backend currently reports healthy. Never propagates.
    async fn available(&self) -> bool {
        self.health_check().await.is_healthy()
    }

    /// Optional model-management capability. Backends that manage local
    /// models (the Ollama daemon) return `Some`; the facade forwards
    /// [`ModelManagement`] calls only when this is present.
    fn model_management(&self) -> Option<&dyn ModelManagement> {
        None
    }
}

/// Extra operations some backends expose beyond the core contract. This is
/// a closed allow-list: the facade forwards exactly these calls, nothing
/// else.
#[async_trait]
pub trait ModelManagement: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    async fn pull_model(&self, model: &str) -> Result<(), ProviderError>;
}
