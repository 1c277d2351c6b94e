//! Anthropic adapter: `/messages` for completion, `/models` for health.
//!
//! Anthropic offers no embeddings API; `generate_embedding` reports the
//! capability as absent so the fallback policy can route embedding calls to
//! another provider.

use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ProviderError;
use crate::prompt::build_prompt;
use crate::providers::{build_http_client, check_status, parse_json};
use crate::traits::Provider;
use crate::types::{
    CompletionResponse, ContextItem, HealthStatus, ProviderOptions, RequestOptions, SharedOptions,
};
use crate::utils::clean_text;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug)]
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    shared: SharedOptions,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(name: &str, options: &ProviderOptions) -> Result<Self, ProviderError> {
        let api_key = options
            .get_str("api_key")
            .map(|key| SecretString::from(key.to_string()))
            .ok_or_else(|| {
                ProviderError::Provider(format!("provider '{name}' requires an 'api_key' option"))
            })?;
        let shared = SharedOptions::parse(options);
        let http = build_http_client(shared.timeout)?;
        Ok(Self {
            name: name.to_string(),
            base_url: options
                .get_str("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: options.get_str("model").unwrap_or(DEFAULT_MODEL).to_string(),
            shared,
            http,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "anthropic"
    }

    fn shared(&self) -> &SharedOptions {
        &self.shared
    }

    async fn generate_embedding(
        &self,
        _text: &str,
        _options: &RequestOptions,
    ) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::ModelNotAvailable(format!(
            "provider '{}' does not offer an embeddings API",
            self.name
        )))
    }

    async fn generate_response(
        &self,
        prompt: &str,
        context: &[ContextItem],
        options: &RequestOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let started = Instant::now();
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.model.clone());
        let full_prompt = build_prompt(
            &self.shared.templates,
            &clean_text(prompt),
            context,
            &self.shared.context_configs,
        );

        let mut body = serde_json::Map::new();
        body.insert("model".to_string(), json!(model));
        body.insert(
            "max_tokens".to_string(),
            json!(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": full_prompt }]),
        );
        if let Some(temperature) = options.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }

        let response = self
            .request(reqwest::Method::POST, "/messages")
            .json(&Value::Object(body))
            .send()
            .await?;
        let payload: MessagesPayload = parse_json(check_status(response).await?).await?;
        let text = payload
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no text in messages response".to_string(),
            ));
        }

        let mut metadata = std::collections::HashMap::new();
        if let Some(usage) = payload.usage {
            metadata.insert("usage".to_string(), usage);
        }
        if let Some(reason) = payload.stop_reason {
            metadata.insert("stop_reason".to_string(), json!(reason));
        }

        Ok(CompletionResponse {
            response: text,
            model: payload.model.unwrap_or(model),
            provider: self.name.clone(),
            processing_time: Some(started.elapsed().as_secs_f64()),
            metadata,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        let probe = async {
            let response = self.request(reqwest::Method::GET, "/models").send().await?;
            check_status(response).await?;
            Ok::<(), ProviderError>(())
        };
        match probe.await {
            Ok(()) => HealthStatus::healthy(&self.name),
            Err(err) => HealthStatus::unavailable(&self.name, &err),
        }
    }
}

#[derive(Deserialize)]
struct MessagesPayload {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Value>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
