//! OpenAI adapter: `/embeddings`, `/chat/completions` and `/models`.

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
use crate::utils::{clean_text, normalize_embedding};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

#[derive(Debug)]
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    embedding_model: String,
    embedding_dimension: usize,
    shared: SharedOptions,
    http: reqwest::Client,
}

impl OpenAiProvider {
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
            embedding_model: options
                .get_str("embedding_model")
                .unwrap_or(DEFAULT_EMBEDDING_MODEL)
                .to_string(),
            embedding_dimension: options
                .get_u64("embedding_dimension")
                .map(|dimension| dimension as usize)
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            shared,
            http,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "openai"
    }

    fn shared(&self) -> &SharedOptions {
        &self.shared
    }

    async fn generate_embedding(
        &self,
        text: &str,
        options: &RequestOptions,
    ) -> Result<Vec<f32>, ProviderError> {
        let model = options.model.as_deref().unwrap_or(&self.embedding_model);
        let body = json!({
            "model": model,
            "input": clean_text(text),
        });
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let payload: EmbeddingPayload = parse_json(check_status(response).await?).await?;
        let raw = payload
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("embedding missing from response".to_string())
            })?;
        normalize_embedding(raw, self.embedding_dimension).ok_or_else(|| {
            ProviderError::InvalidResponse("backend returned no usable embedding vector".to_string())
        })
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
            "messages".to_string(),
            json!([{ "role": "user", "content": full_prompt }]),
        );
        if let Some(temperature) = options.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&Value::Object(body))
            .send()
            .await?;
        let payload: ChatPayload = parse_json(check_status(response).await?).await?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no text in chat response".to_string())
            })?;

        let mut metadata = std::collections::HashMap::new();
        if let Some(usage) = payload.usage {
            metadata.insert("usage".to_string(), usage);
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
            let response = self
                .http
                .get(format!("{}/models", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .send()
                .await?;
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
struct EmbeddingPayload {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Value,
}

#[derive(Deserialize)]
struct ChatPayload {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
