//! Gemini adapter: `models/{model}:embedContent`, `:generateContent` and the
//! model listing endpoint. Authentication travels as a `key` query parameter.

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

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug)]
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    embedding_model: String,
    embedding_dimension: usize,
    shared: SharedOptions,
    http: reqwest::Client,
}

impl GeminiProvider {
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

    fn keyed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.query(&[("key", self.api_key.expose_secret())])
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "gemini"
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
            "model": format!("models/{model}"),
            "content": { "parts": [{ "text": clean_text(text) }] },
        });
        let url = format!("{}/models/{model}:embedContent", self.base_url);
        let response = self.keyed(self.http.post(url)).json(&body).send().await?;
        let payload: EmbedPayload = parse_json(check_status(response).await?).await?;
        let raw = payload
            .embedding
            .map(|embedding| embedding.values)
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

        let mut generation = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        let mut body = json!({
            "contents": [{ "parts": [{ "text": full_prompt }] }],
        });
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let response = self.keyed(self.http.post(url)).json(&body).send().await?;
        let payload: GeneratePayload = parse_json(check_status(response).await?).await?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no text in generate response".to_string())
            })?;

        let mut metadata = std::collections::HashMap::new();
        if let Some(usage) = payload.usage_metadata {
            metadata.insert("usage".to_string(), usage);
        }

        Ok(CompletionResponse {
            response: text,
            model,
            provider: self.name.clone(),
            processing_time: Some(started.elapsed().as_secs_f64()),
            metadata,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        let probe = async {
            let builder = self
                .http
                .get(format!("{}/models", self.base_url))
                .query(&[("pageSize", "1")]);
            let response = self.keyed(builder).send().await?;
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
struct EmbedPayload {
    embedding: Option<EmbedValues>,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Value,
}

#[derive(Deserialize)]
struct GeneratePayload {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<Value>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_required() {
        let err = GeminiProvider::new("gemini", &ProviderOptions::new()).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn construction_defaults() {
        let options = ProviderOptions::new().with("api_key", "g-test");
        let provider = GeminiProvider::new("gemini", &options).unwrap();
        assert_eq!(provider.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(provider.embedding_dimension, DEFAULT_EMBEDDING_DIMENSION);
    }
}
