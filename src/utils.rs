//! Shared helpers used by every backend adapter: text cleaning and embedding
//! dimension normalization. Implemented once here, never per backend.

use serde_json::Value;

/// Maximum number of characters sent to a backend for embedding or
/// completion.
pub const MAX_TEXT_LENGTH: usize = 8000;

/// Collapse all whitespace runs (spaces, tabs, newlines) to a single space,
/// trim, and cap at [`MAX_TEXT_LENGTH`] characters.
pub fn clean_text(input: &str) -> String {
    let collapsed: String = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_TEXT_LENGTH {
        collapsed
    } else {
        collapsed.chars().take(MAX_TEXT_LENGTH).collect()
    }
}

/// Force a vector to exactly `target` elements: truncate when longer,
/// right-pad with zeros when shorter.
pub fn normalize_dimension(mut embedding: Vec<f32>, target: usize) -> Vec<f32> {
    embedding.truncate(target);
    embedding.resize(target, 0.0);
    embedding
}

/// Extract an embedding vector from a raw backend value and normalize it to
/// the declared target dimensionality. Returns `None` when the value is not
/// a numeric array, signalling an unusable backend payload.
pub fn normalize_embedding(value: Value, target: usize) -> Option<Vec<f32>> {
    let Value::Array(items) = value else {
        return None;
    };
    let mut out = Vec::with_capacity(target.min(items.len()));
    for item in items.into_iter().take(target) {
        out.push(item.as_f64()? as f32);
    }
    Some(normalize_dimension(out, target))
}
