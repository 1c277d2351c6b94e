//! Backend adapters.
//!
//! Thin request/response shaping per remote service. Everything with design
//! depth (error classification, text cleaning, embedding normalization,
//! prompt building, context formatting) comes from the shared contract
//! helpers and is not reimplemented here.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// Classify non-success responses through the shared taxonomy.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, &body))
}

/// Decode a JSON payload, mapping decode failures to `InvalidResponse`.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    response
        .json::<T>()
        .await
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ProviderError::Provider(format!("failed to build HTTP client: {err}")))
}
