//! Salvaging JSON from model output.
//!
//! Models wrap answers in code fences or prose. These helpers strip the
//! fences, cut out the outermost array or object and decode it leniently.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use researchkit_shared::{ResearchError, Result};

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
pub fn sanitize_llm_output(text: &str) -> String {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced);
    unfenced.trim().to_string()
}

fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// From the first `[` to the last `]`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    span(text, '[', ']')
}

/// From the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    span(text, '{', '}')
}

/// Decode a JSON array of `T` from model output.
///
/// A bare object is accepted as a one-element array.
pub fn parse_json_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let cleaned = sanitize_llm_output(text);

    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(_) => {
            let slice = extract_json_array(&cleaned)
                .or_else(|| extract_json_object(&cleaned))
                .ok_or_else(|| ResearchError::parse("no JSON array in model output"))?;
            serde_json::from_str(slice)
                .map_err(|e| ResearchError::parse(format!("invalid JSON array: {e}")))?
        }
    };

    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(ResearchError::parse(format!(
                "expected JSON array, got {other}"
            )));
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| ResearchError::parse(format!("invalid array item: {e}")))
        })
        .collect()
}

/// Decode a JSON object `T` from model output.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let cleaned = sanitize_llm_output(text);

    if let Ok(v) = serde_json::from_str::<T>(&cleaned) {
        return Ok(v);
    }

    let slice = extract_json_object(&cleaned)
        .ok_or_else(|| ResearchError::parse("no JSON object in model output"))?;
    serde_json::from_str(slice).map_err(|e| ResearchError::parse(format!("invalid JSON object: {e}")))
}

/// Deserialize any scalar as text: strings as-is, numbers and booleans
/// via `to_string`, null as empty, arrays joined with ", ".
pub fn loose_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
