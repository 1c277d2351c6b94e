//! Ollama adapter: the local model-serving daemon.
//!
//! Uses `/api/embeddings`, `/api/generate` and `/api/tags`. This is the only
//! backend that exposes model management (listing and pulling local models).

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ProviderError;
use crate::prompt::build_prompt;
use crate::providers::{build_http_client, check_status, parse_json};
use crate::traits::{ModelManagement, Provider};
use crate::types::{
    CompletionResponse, ContextItem, HealthStatus, ModelInfo, ProviderOptions, RequestOptions,
    SharedOptions,
};
use crate::utils::{clean_text, normalize_embedding};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug)]
pub struct OllamaProvider {
    name: String,
    base_url: String,
    model: String,
    embedding_model: String,
    embedding_dimension: usize,
    shared: SharedOptions,
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(name: &str, options: &ProviderOptions) -> Result<Self, ProviderError> {
        let shared = SharedOptions::parse(options);
        let http = build_http_client(shared.timeout)?;
        Ok(Self {
            name: name.to_string(),
            base_url: options
                .get_str("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
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

    async fn fetch_tags(&self) -> Result<TagsPayload, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        parse_json(check_status(response).await?).await
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "ollama"
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
            "prompt": clean_text(text),
        });
        let response = self
            .http
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await?;
        let payload: EmbeddingPayload = parse_json(check_status(response).await?).await?;
        let raw = payload.embedding.ok_or_else(|| {
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
            generation.insert("num_predict".to_string(), json!(max_tokens));
        }
        let mut body = json!({
            "model": model,
            "prompt": full_prompt,
            "stream": false,
        });
        if !generation.is_empty() {
            body["options"] = Value::Object(generation);
        }

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;
        let payload: GeneratePayload = parse_json(check_status(response).await?).await?;
        let text = payload
            .response
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no text in generate response".to_string())
            })?;

        let mut metadata = std::collections::HashMap::new();
        if let Some(count) = payload.eval_count {
            metadata.insert("eval_count".to_string(), json!(count));
        }
        if let Some(count) = payload.prompt_eval_count {
            metadata.insert("prompt_eval_count".to_string(), json!(count));
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
        match self.fetch_tags().await {
            Ok(tags) => HealthStatus::healthy(&self.name)
                .with_detail("models", json!(tags.models.len())),
            Err(err) => HealthStatus::unavailable(&self.name, &err),
        }
    }

    fn model_management(&self) -> Option<&dyn ModelManagement> {
        Some(self)
    }
}

#[async_trait]
impl ModelManagement for OllamaProvider {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let tags = self.fetch_tags().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|model| ModelInfo {
                id: model.name,
                size: model.size,
                modified_at: model.modified_at,
            })
            .collect())
    }

    async fn pull_model(&self, model: &str) -> Result<(), ProviderError> {
        let body = json!({ "name": model, "stream": false });
        let response = self
            .http
            .post(format!("{}/api/pull", self.base_url))
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct EmbeddingPayload {
    embedding: Option<Value>,
}

#[derive(Deserialize)]
struct GeneratePayload {
    response: Option<String>,
    model: Option<String>,
    eval_count: Option<u64>,
    prompt_eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct TagsPayload {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    size: Option<u64>,
    modified_at: Option<String>,
}
