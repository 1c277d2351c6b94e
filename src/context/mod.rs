//! Context Engine
//!
//! Turns arbitrary structured records into (a) a human-readable line for
//! prompt context and (b) a restricted text blob for embedding generation.
//! Entirely driven by caller-supplied [`ContextConfig`]s; there are no
//! hardcoded domain schemas, and the engine works with zero configuration
//! through its fallback paths. Malformed templates degrade gracefully and
//! never surface an error to the caller.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::types::{ContextConfig, ContextItem};

/// Named context configurations in declaration order. Order matters: type
/// detection ties keep the first configured entry.
pub type ContextConfigs = Vec<(String, ContextConfig)>;

/// The reserved fallback config name.
pub const DEFAULT_CONTEXT_TYPE: &str = "default";

/// Minimum fraction of a config's declared fields that must be present in a
/// record for field-overlap detection to pick that config. Tunable; the
/// value is inherited, not load-bearing.
pub const TYPE_MATCH_THRESHOLD: f64 = 0.5;

/// Structural and metadata fields excluded from embedding text when no
/// `embedding_fields` are configured. Matched case-insensitively.
const EXCLUDED_EMBEDDING_FIELDS: [&str; 9] = [
    "id",
    "_id",
    "uuid",
    "created_at",
    "updated_at",
    "timestamp",
    "version",
    "status",
    "active",
];

/// Fields whose presence short-circuits type detection, in precedence order.
const TYPE_FIELDS: [&str; 3] = ["type", "context_type", "model_type"];

/// Detect the semantic type of a record.
///
/// An explicit `type`, `context_type` or `model_type` field wins outright
/// (`model_type` values are lowercased). Otherwise each configured type is
/// scored by the fraction of its declared fields present in the record and
/// the best score at or above [`TYPE_MATCH_THRESHOLD`] wins, first-configured
/// taking ties. Everything else is [`DEFAULT_CONTEXT_TYPE`].
pub fn detect_type(record: &Map<String, Value>, configs: &[(String, ContextConfig)]) -> String {
    for field in TYPE_FIELDS {
        if let Some(value) = record.get(field)
            && let Some(text) = value_as_text(value)
        {
            return if field == "model_type" {
                text.to_lowercase()
            } else {
                text
            };
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (name, config) in configs {
        if name == DEFAULT_CONTEXT_TYPE || config.fields.is_empty() {
            continue;
        }
        let hits = config
            .fields
            .iter()
            .filter(|field| record.contains_key(*field))
            .count();
        let score = hits as f64 / config.fields.len() as f64;
        // Strictly-greater comparison keeps the first configured entry on ties.
        if score >= TYPE_MATCH_THRESHOLD && best.is_none_or(|(_, b)| score > b) {
            best = Some((name.as_str(), score));
        }
    }
    best.map(|(name, _)| name.to_string())
        .unwrap_or_else(|| DEFAULT_CONTEXT_TYPE.to_string())
}

/// Render a context item into a single human-readable line.
pub fn format_item(item: &ContextItem, configs: &[(String, ContextConfig)]) -> String {
    match item {
        ContextItem::Text(text) => text.clone(),
        ContextItem::Record(record) => format_record(record, configs),
    }
}

/// Extract the text used to embed a context item.
///
/// Configured `embedding_fields` win; without them, all record fields are
/// scanned minus the structural denylist, keeping non-blank string and
/// numeric values. Plain-text items return themselves verbatim.
pub fn embedding_text(item: &ContextItem, configs: &[(String, ContextConfig)]) -> String {
    match item {
        ContextItem::Text(text) => text.clone(),
        ContextItem::Record(record) => {
            let type_name = detect_type(record, configs);
            if let Some(config) = config_for(configs, &type_name)
                && !config.embedding_fields.is_empty()
            {
                return config
                    .embedding_fields
                    .iter()
                    .filter_map(|field| record.get(field).and_then(value_as_text))
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            record
                .iter()
                .filter(|(key, _)| {
                    !EXCLUDED_EMBEDDING_FIELDS
                        .iter()
                        .any(|excluded| excluded.eq_ignore_ascii_case(key))
                })
                .filter_map(|(_, value)| value_as_text(value))
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Substitute `%{name}` placeholders from `vars`. Returns `None` when the
/// template references a missing variable or is malformed, so callers can
/// fall back instead of erroring.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        out.push_str(vars.get(&after[..end])?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Look up a config by detected type name, falling back to the reserved
/// `default` entry.
pub fn config_for<'a>(
    configs: &'a [(String, ContextConfig)],
    type_name: &str,
) -> Option<&'a ContextConfig> {
    configs
        .iter()
        .find(|(name, _)| name == type_name)
        .or_else(|| configs.iter().find(|(name, _)| name == DEFAULT_CONTEXT_TYPE))
        .map(|(_, config)| config)
}

fn format_record(record: &Map<String, Value>, configs: &[(String, ContextConfig)]) -> String {
    let type_name = detect_type(record, configs);
    let config = config_for(configs, &type_name);

    let declared: Vec<String> = match config {
        Some(config) if !config.fields.is_empty() => config.fields.clone(),
        _ => record.keys().cloned().collect(),
    };

    let template = config.and_then(|config| config.format.as_deref());
    let Some(template) = template else {
        return key_value_join(record, &declared);
    };

    let mut vars = HashMap::new();
    for field in &declared {
        if let Some(value) = record.get(field) {
            vars.insert(field.clone(), display_value(value));
        }
    }
    if vars.is_empty() {
        return key_value_join(record, &declared);
    }
    render_template(template, &vars).unwrap_or_else(|| key_value_join(record, &declared))
}

/// `"key: value, key: value"` over the given fields, skipping absent ones.
fn key_value_join(record: &Map<String, Value>, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|field| {
            record
                .get(field)
                .map(|value| format!("{field}: {}", display_value(value)))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coerce string and numeric values to text; everything else is not
/// embeddable content.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Display form for context formatting: raw strings, JSON for the rest.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn configs(entries: &[(&str, Value)]) -> ContextConfigs {
        entries
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::from_value(value.clone()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn explicit_type_field_short_circuits() {
        let configs = configs(&[("article", json!({"fields": ["headline", "body"]}))]);
        let rec = record(json!({"type": "product", "headline": "H", "body": "B"}));
        assert_eq!(detect_type(&rec, &configs), "product");
    }

    #[test]
    fn model_type_is_lowercased() {
        let rec = record(json!({"model_type": "Document"}));
        assert_eq!(detect_type(&rec, &[]), "document");
    }

    #[test]
    fn half_overlap_matches_configured_type() {
        let configs = configs(&[("article", json!({"fields": ["headline", "body"]}))]);
        let rec = record(json!({"headline": "H", "unrelated": 1}));
        assert_eq!(detect_type(&rec, &configs), "article");
    }

    #[test]
    fn below_threshold_falls_back_to_default() {
        let configs = configs(&[("article", json!({"fields": ["headline", "body", "byline"]}))]);
        let rec = record(json!({"headline": "H", "unrelated": 1}));
        assert_eq!(detect_type(&rec, &configs), "default");
    }

    #[test]
    fn ties_keep_first_configured_type() {
        let configs = configs(&[
            ("article", json!({"fields": ["title"]})),
            ("product", json!({"fields": ["title"]})),
        ]);
        let rec = record(json!({"title": "T"}));
        assert_eq!(detect_type(&rec, &configs), "article");
    }

    #[test]
    fn ties_keep_first_configured_type_through_parsed_options() {
        use crate::types::{ProviderOptions, SharedOptions};

        // "zeta" is configured before "alpha"; declaration order must win
        // over any lexicographic ordering of the options map.
        let options = ProviderOptions::new().with(
            "context_configs",
            json!({
                "zeta": {"fields": ["title"]},
                "alpha": {"fields": ["title"]}
            }),
        );
        let shared = SharedOptions::parse(&options);
        let rec = record(json!({"title": "T"}));
        assert_eq!(detect_type(&rec, &shared.context_configs), "zeta");
    }

    #[test]
    fn no_configs_yields_default() {
        let rec = record(json!({"anything": "x"}));
        assert_eq!(detect_type(&rec, &[]), "default");
    }

    #[test]
    fn format_without_template_joins_key_values() {
        let configs = configs(&[("article", json!({"fields": ["title", "author"]}))]);
        let item = ContextItem::from_value(json!({
            "type": "article", "title": "T", "author": "A", "ignored": "x"
        }));
        assert_eq!(format_item(&item, &configs), "title: T, author: A");
    }

    #[test]
    fn format_with_template_substitutes_fields() {
        let configs = configs(&[(
            "article",
            json!({"fields": ["title", "author"], "format": "%{title} by %{author}"}),
        )]);
        let item = ContextItem::from_value(json!({"type": "article", "title": "T", "author": "A"}));
        assert_eq!(format_item(&item, &configs), "T by A");
    }

    #[test]
    fn template_with_missing_field_falls_back() {
        let configs = configs(&[(
            "article",
            json!({"fields": ["title", "author"], "format": "%{title} by %{author}"}),
        )]);
        let item = ContextItem::from_value(json!({"type": "article", "title": "T"}));
        assert_eq!(format_item(&item, &configs), "title: T");
    }

    #[test]
    fn format_with_no_config_uses_all_fields() {
        let item = ContextItem::from_value(json!({"a": 1, "b": "two"}));
        let formatted = format_item(&item, &[]);
        assert!(formatted.contains("a: 1"));
        assert!(formatted.contains("b: two"));
        assert!(formatted.contains(", "));
    }

    #[test]
    fn text_items_format_verbatim() {
        let item = ContextItem::from("just text");
        assert_eq!(format_item(&item, &[]), "just text");
    }

    #[test]
    fn embedding_text_uses_configured_fields_in_order() {
        let configs = configs(&[(
            "article",
            json!({"fields": ["title", "content"], "embedding_fields": ["title", "content"]}),
        )]);
        let item = ContextItem::from_value(json!({
            "type": "article", "content": "C", "title": "T", "created_at": "2024-01-01"
        }));
        assert_eq!(embedding_text(&item, &configs), "T C");
    }

    #[test]
    fn embedding_text_fallback_excludes_structural_fields() {
        let item = ContextItem::from_value(json!({
            "title": "T", "content": "C", "created_at": "X",
            "UUID": "u", "Status": "ok", "version": 2
        }));
        let text = embedding_text(&item, &[]);
        assert!(text.contains('T'));
        assert!(text.contains('C'));
        assert!(!text.contains('X'));
        assert!(!text.contains('u'));
        assert!(!text.contains("ok"));
        assert!(!text.contains('2'));
    }

    #[test]
    fn embedding_text_skips_blank_and_non_scalar_values() {
        let item = ContextItem::from_value(json!({
            "title": "  ", "body": "B", "tags": ["a", "b"], "count": 3
        }));
        let text = embedding_text(&item, &[]);
        assert!(text.contains('B'));
        assert!(text.contains('3'));
        assert!(!text.contains('a'));
    }

    #[test]
    fn embedding_text_for_plain_strings() {
        let item = ContextItem::from("verbatim text");
        assert_eq!(embedding_text(&item, &[]), "verbatim text");
    }

    #[test]
    fn render_template_basic() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "world".to_string());
        assert_eq!(
            render_template("hello %{name}!", &vars),
            Some("hello world!".to_string())
        );
    }

    #[test]
    fn render_template_missing_key_is_recoverable() {
        assert_eq!(render_template("hi %{missing}", &HashMap::new()), None);
    }

    #[test]
    fn render_template_unclosed_placeholder_is_recoverable() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "1".to_string());
        assert_eq!(render_template("broken %{a", &vars), None);
    }

    #[test]
    fn render_template_without_placeholders() {
        assert_eq!(
            render_template("plain", &HashMap::new()),
            Some("plain".to_string())
        );
    }
}
