//! Decoder for the model's structured answer.
//!
//! Models are asked for a JSON object with `summary`, `category` and an
//! optional `error`. They frequently wrap it in a Markdown code fence, so the
//! decoder strips one leading ```` ``` ```` / ```` ```json ```` marker and a
//! trailing ```` ``` ```` before parsing.

use crate::error::DecodeError;
use crate::models::Extracted;
use crate::utils::looks_truncated;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(?P<inner>.*?)\r?\n?```\s*$").unwrap()
});

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Remove a surrounding code fence, if any, and trim.
pub fn strip_fences(content: &str) -> &str {
    match FENCE.captures(content).and_then(|c| c.name("inner")) {
        Some(inner) => inner.as_str().trim(),
        None => content.trim(),
    }
}

/// Decode a raw completion into a summary and a category.
pub fn decode_answer(content: &str) -> Result<Extracted, DecodeError> {
    let body = strip_fences(content);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        if looks_truncated(&e) {
            DecodeError::Truncated
        } else {
            DecodeError::Malformed(e.to_string())
        }
    })?;
    // A struct visitor also accepts sequences, so the shape is checked first.
    let serde_json::Value::Object(map) = value else {
        return Err(DecodeError::Malformed("not a JSON object".to_string()));
    };
    let raw: RawAnswer = serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if let Some(message) = raw.error.as_ref().and_then(declared_error) {
        return Err(DecodeError::Declared(message));
    }

    let summary = non_empty(raw.summary).ok_or(DecodeError::MissingField("summary"))?;
    let category = non_empty(raw.category).ok_or(DecodeError::MissingField("category"))?;
    Ok(Extracted { summary, category })
}

fn declared_error(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_decodes() {
        let out = decode_answer(r#"{"summary": "Two lines.", "category": "sales"}"#).unwrap();
        assert_eq!(out.summary, "Two lines.");
        assert_eq!(out.category, "sales");
    }

    #[test]
    fn test_fenced_json_decodes() {
        let content = "```json\n{\"summary\": \"S\", \"category\": \"leadership\"}\n```";
        let out = decode_answer(content).unwrap();
        assert_eq!(out.category, "leadership");
    }

    #[test]
    fn test_bare_fence_without_language_tag() {
        assert_eq!(strip_fences("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_declared_error_is_reported() {
        let err = decode_answer(r#"{"error": "no content provided"}"#).unwrap_err();
        assert_eq!(err, DecodeError::Declared("no content provided".to_string()));
    }

    #[test]
    fn test_empty_error_field_is_ignored() {
        let out =
            decode_answer(r#"{"summary": "S", "category": "sales", "error": ""}"#).unwrap();
        assert_eq!(out.summary, "S");
        let out =
            decode_answer(r#"{"summary": "S", "category": "sales", "error": null}"#).unwrap();
        assert_eq!(out.category, "sales");
    }

    #[test]
    fn test_missing_fields_are_typed() {
        assert_eq!(
            decode_answer(r#"{"category": "sales"}"#).unwrap_err(),
            DecodeError::MissingField("summary")
        );
        assert_eq!(
            decode_answer(r#"{"summary": "S", "category": "  "}"#).unwrap_err(),
            DecodeError::MissingField("category")
        );
    }

    #[test]
    fn test_prose_is_malformed() {
        assert!(matches!(
            decode_answer("Here is your summary: it is great."),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_answer(r#"["summary", "category"]"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_array_answer_is_malformed() {
        assert_eq!(
            decode_answer(r#"["Buy now", "sales"]"#).unwrap_err(),
            DecodeError::Malformed("not a JSON object".to_string())
        );
        assert_eq!(
            decode_answer("```json\n[\"S\", \"sales\", null]\n```").unwrap_err(),
            DecodeError::Malformed("not a JSON object".to_string())
        );
        assert_eq!(
            decode_answer("42").unwrap_err(),
            DecodeError::Malformed("not a JSON object".to_string())
        );
    }

    #[test]
    fn test_wrongly_typed_field_is_malformed() {
        assert!(matches!(
            decode_answer(r#"{"summary": 5, "category": "sales"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_cut_off_answer_is_truncated() {
        assert_eq!(
            decode_answer(r#"{"summary": "Half a sent"#).unwrap_err(),
            DecodeError::Truncated
        );
    }
}
