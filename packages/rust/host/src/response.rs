//! Decoding of host result strings.
//!
//! Host ops answer with JSON-encoded strings (`{"text": ..}`,
//! `{"instanceId": ..}`, ...) or, for some ops, bare values.

use serde::de::DeserializeOwned;
use serde_json::Value;

use researchkit_shared::{ResearchError, Result};

/// Read `field` from a JSON object reply, or take the reply itself when it
/// is not a JSON object. A missing or null field yields an empty string.
pub(crate) fn field_or_raw(raw: &str, field: &str) -> String {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => map.get(field).map(scalar_text).unwrap_or_default(),
        Ok(Value::String(s)) => s,
        _ => raw.trim().to_string(),
    }
}

/// Read a boolean `field` from a JSON object reply.
pub(crate) fn flag(raw: &str, field: &str) -> bool {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => map.get(field).and_then(Value::as_bool).unwrap_or(false),
        Ok(Value::Bool(b)) => b,
        _ => false,
    }
}

/// Decode a typed reply.
pub(crate) fn decode<T: DeserializeOwned>(op: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw.trim()).map_err(|e| {
        let head: String = raw.chars().take(120).collect();
        ResearchError::parse(format!("{op}: unexpected reply {head:?}: {e}"))
    })
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_from_object_or_raw() {
        assert_eq!(field_or_raw(r#"{"text":"Hello"}"#, "text"), "Hello");
        assert_eq!(field_or_raw(r#"{"instanceId":7}"#, "instanceId"), "7");
        assert_eq!(field_or_raw(r#"{"other":1}"#, "text"), "");
        assert_eq!(field_or_raw("tab-42\n", "instanceId"), "tab-42");
        assert_eq!(field_or_raw(r#""quoted""#, "text"), "quoted");
    }

    #[test]
    fn flag_reads_ok_field() {
        assert!(flag(r#"{"ok":true}"#, "ok"));
        assert!(!flag(r#"{"ok":false}"#, "ok"));
        assert!(!flag("done", "ok"));
    }

    #[test]
    fn decode_reports_op_on_failure() {
        let err = decode::<Vec<String>>("window.get_inactive_titles", "nope").unwrap_err();
        assert!(err.to_string().contains("window.get_inactive_titles"));
    }
}
