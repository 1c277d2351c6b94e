//! Shared data model used across the provider contract, the registry and the
//! client facade.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ContextConfigs;
use crate::error::ProviderError;
use crate::prompt::PromptTemplates;

/// Transport timeout applied when neither the provider options nor the
/// client configuration override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a text generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text.
    pub response: String,
    /// Model that produced the text.
    pub model: String,
    /// Registered provider name that served the call.
    pub provider: String,
    /// Wall-clock seconds spent on the backend round trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// Backend-specific extras (token counts, stop reasons, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Health of a single provider backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unavailable,
}

/// Structured health-check result. Health checks never fail: backend errors
/// are folded into an `Unavailable` status carrying the error kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub provider: String,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl HealthStatus {
    pub fn healthy(provider: &str) -> Self {
        Self {
            status: HealthState::Healthy,
            provider: provider.to_string(),
            checked_at: Utc::now(),
            error_kind: None,
            message: None,
            details: HashMap::new(),
        }
    }

    pub fn unavailable(provider: &str, error: &ProviderError) -> Self {
        Self {
            status: HealthState::Unavailable,
            provider: provider.to_string(),
            checked_at: Utc::now(),
            error_kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

/// Description of a model exposed by a backend that supports model
/// management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// Per-call options. The same options travel unchanged to every fallback
/// candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Override the provider's default model for this call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Backend-specific pass-through parameters.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Free-form provider configuration map.
///
/// Recognized shared keys are `timeout`, `prompt_templates` and
/// `context_configs`; everything else (`base_url`, `api_key`, `model`, ...)
/// is interpreted by the concrete backend factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderOptions(serde_json::Map<String, Value>);

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }
}

/// One unit of retrieval-augmented input supplied alongside a prompt: either
/// free text or a structured record with no fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextItem {
    Text(String),
    Record(serde_json::Map<String, Value>),
}

impl ContextItem {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Record(map),
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for ContextItem {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Map<String, Value>> for ContextItem {
    fn from(record: serde_json::Map<String, Value>) -> Self {
        Self::Record(record)
    }
}

/// Caller-defined schema describing how records of one semantic type are
/// formatted for prompt context and reduced to embedding text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Field names, in display order. Also drives type detection scoring.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Optional display template with `%{name}` placeholders.
    #[serde(default)]
    pub format: Option<String>,
    /// Fields whose values make up the embedding text, in order.
    #[serde(default)]
    pub embedding_fields: Vec<String>,
}

/// Shared option keys parsed once per provider instance and consumed by the
/// contract helpers.
#[derive(Debug, Clone)]
pub struct SharedOptions {
    pub timeout: Duration,
    pub templates: PromptTemplates,
    pub context_configs: ContextConfigs,
}

impl Default for SharedOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            templates: PromptTemplates::default(),
            context_configs: Vec::new(),
        }
    }
}

impl SharedOptions {
    /// Parse `timeout`, `prompt_templates` and `context_configs` out of a
    /// provider options map. Malformed entries degrade to defaults rather
    /// than failing construction.
    pub fn parse(options: &ProviderOptions) -> Self {
        let timeout = options
            .get_f64("timeout")
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_TIMEOUT);
        let templates = PromptTemplates::from_options(options);
        let mut context_configs = Vec::new();
        if let Some(Value::Object(map)) = options.get("context_configs") {
            for (name, value) in map {
                let config: ContextConfig =
                    serde_json::from_value(value.clone()).unwrap_or_default();
                context_configs.push((name.clone(), config));
            }
        }
        Self {
            timeout,
            templates,
            context_configs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_item_from_value() {
        assert_eq!(
            ContextItem::from_value(json!("plain")),
            ContextItem::Text("plain".to_string())
        );
        assert!(matches!(
            ContextItem::from_value(json!({"title": "T"})),
            ContextItem::Record(_)
        ));
    }

    #[test]
    fn shared_options_parse_timeout_and_configs() {
        let options = ProviderOptions::new()
            .with("timeout", 5.0)
            .with(
                "context_configs",
                json!({
                    "document": {
                        "fields": ["title", "content"],
                        "embedding_fields": ["title"]
                    }
                }),
            );
        let shared = SharedOptions::parse(&options);
        assert_eq!(shared.timeout, Duration::from_secs(5));
        assert_eq!(shared.context_configs.len(), 1);
        assert_eq!(shared.context_configs[0].0, "document");
        assert_eq!(shared.context_configs[0].1.fields, vec!["title", "content"]);
    }

    #[test]
    fn shared_options_defaults() {
        let shared = SharedOptions::parse(&ProviderOptions::new());
        assert_eq!(shared.timeout, DEFAULT_TIMEOUT);
        assert!(shared.context_configs.is_empty());
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let options = ProviderOptions::new().with("timeout", -1.0);
        assert_eq!(SharedOptions::parse(&options).timeout, DEFAULT_TIMEOUT);
    }
}
