//! Prompt building shared by all backend adapters.
//!
//! A fixed default template set is merged key-by-key with caller overrides
//! from the `prompt_templates` provider option; rendering uses the same
//! `%{name}` placeholder syntax as context formatting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{format_item, render_template};
use crate::types::{ContextConfig, ContextItem, ProviderOptions};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the provided context when it is relevant to the question.";
const DEFAULT_NO_CONTEXT_TEMPLATE: &str = "%{system_prompt}\n\nQuestion: %{query}\n\nAnswer:";
const DEFAULT_WITH_CONTEXT_TEMPLATE: &str =
    "%{system_prompt}\n\nContext:\n%{context}\n\nQuestion: %{query}\n\nAnswer:";

/// The template set every provider carries. Caller overrides win key-by-key;
/// untouched keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub system_prompt: String,
    pub no_context_template: String,
    pub with_context_template: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            no_context_template: DEFAULT_NO_CONTEXT_TEMPLATE.to_string(),
            with_context_template: DEFAULT_WITH_CONTEXT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Merge the defaults with the `prompt_templates` entry of a provider
    /// options map, if present.
    pub fn from_options(options: &ProviderOptions) -> Self {
        let mut templates = Self::default();
        if let Some(Value::Object(overrides)) = options.get("prompt_templates") {
            if let Some(value) = overrides.get("system_prompt").and_then(Value::as_str) {
                templates.system_prompt = value.to_string();
            }
            if let Some(value) = overrides.get("no_context_template").and_then(Value::as_str) {
                templates.no_context_template = value.to_string();
            }
            if let Some(value) = overrides
                .get("with_context_template")
                .and_then(Value::as_str)
            {
                templates.with_context_template = value.to_string();
            }
        }
        templates
    }
}

/// Build the full prompt sent to a backend.
///
/// With no context items the `no_context_template` is rendered from
/// `%{system_prompt}` and `%{query}`; otherwise `%{context}` carries the
/// 1-indexed, blank-line-separated list of formatted items. A caller
/// template that references unknown placeholders falls back to the default
/// template instead of erroring.
pub fn build_prompt(
    templates: &PromptTemplates,
    query: &str,
    items: &[ContextItem],
    configs: &[(String, ContextConfig)],
) -> String {
    let mut vars = HashMap::new();
    vars.insert("system_prompt".to_string(), templates.system_prompt.clone());
    vars.insert("query".to_string(), query.to_string());

    if items.is_empty() {
        render_template(&templates.no_context_template, &vars)
            .or_else(|| render_template(DEFAULT_NO_CONTEXT_TEMPLATE, &vars))
            .unwrap_or_else(|| format!("{}\n\n{query}", templates.system_prompt))
    } else {
        let context = items
            .iter()
            .enumerate()
            .map(|(index, item)| format!("{}. {}", index + 1, format_item(item, configs)))
            .collect::<Vec<_>>()
            .join("\n\n");
        vars.insert("context".to_string(), context);
        render_template(&templates.with_context_template, &vars)
            .or_else(|| render_template(DEFAULT_WITH_CONTEXT_TEMPLATE, &vars))
            .unwrap_or_else(|| format!("{}\n\n{query}", templates.system_prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfigs;
    use serde_json::json;

    #[test]
    fn overrides_merge_key_by_key() {
        let options = ProviderOptions::new().with(
            "prompt_templates",
            json!({"system_prompt": "Be terse."}),
        );
        let templates = PromptTemplates::from_options(&options);
        assert_eq!(templates.system_prompt, "Be terse.");
        assert_eq!(templates.no_context_template, DEFAULT_NO_CONTEXT_TEMPLATE);
        assert_eq!(
            templates.with_context_template,
            DEFAULT_WITH_CONTEXT_TEMPLATE
        );
    }

    #[test]
    fn no_context_uses_no_context_template() {
        let prompt = build_prompt(&PromptTemplates::default(), "What is Rust?", &[], &[]);
        assert!(prompt.contains("Question: What is Rust?"));
        assert!(!prompt.contains("Context:"));
    }

    #[test]
    fn context_items_are_numbered_from_one() {
        let items = vec![ContextItem::from("first fact"), ContextItem::from("second fact")];
        let prompt = build_prompt(&PromptTemplates::default(), "q", &items, &[]);
        assert!(prompt.contains("1. first fact"));
        assert!(prompt.contains("2. second fact"));
        assert!(prompt.contains("1. first fact\n\n2. second fact"));
    }

    #[test]
    fn bad_override_template_falls_back_to_default() {
        let options = ProviderOptions::new().with(
            "prompt_templates",
            json!({"no_context_template": "%{nonexistent} %{query}"}),
        );
        let templates = PromptTemplates::from_options(&options);
        let prompt = build_prompt(&templates, "hello", &[], &[]);
        assert!(prompt.contains("Question: hello"));
    }

    #[test]
    fn record_items_are_formatted_through_the_context_engine() {
        let configs: ContextConfigs = vec![(
            "document".to_string(),
            serde_json::from_value(json!({
                "fields": ["title"], "format": "doc %{title}"
            }))
            .unwrap(),
        )];
        let items = vec![ContextItem::from_value(
            json!({"type": "document", "title": "T"}),
        )];
        let prompt = build_prompt(&PromptTemplates::default(), "q", &items, &configs);
        assert!(prompt.contains("1. doc T"));
    }
}
