//! Non-streaming response aggregation.

use crate::types::CompletionResult;
use crate::Result;
use serde_json::Value;

/// Parse a complete `chat/completions` body.
///
/// The id falls back to a fresh UUID when absent. The text is every
/// `choices[].message.content` concatenated in order, then trimmed.
pub fn parse_completion_body(body: &str) -> Result<CompletionResult> {
    let root: Value = serde_json::from_str(body)?;

    let id = match root.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    let mut text = String::new();
    if let Some(choices) = root.get("choices").and_then(Value::as_array) {
        for choice in choices {
            match choice.get("message").and_then(|m| m.get("content")) {
                Some(Value::String(s)) => text.push_str(s),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => text.push_str(&v.to_string()),
                _ => {}
            }
        }
    }

    Ok(CompletionResult::new(id, text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_choice() {
        let body = r#"{"id":"test-id","choices":[{"message":{"content":"Hi there!"}}]}"#;
        let result = parse_completion_body(body).unwrap();
        assert_eq!(result, CompletionResult::new("test-id", "Hi there!"));
    }

    #[test]
    fn test_choices_are_concatenated_and_trimmed() {
        let body = r#"{"id":"x","choices":[
            {"message":{"content":"  Hello"}},
            {"message":{"content":null}},
            {"finish_reason":"stop"},
            {"message":{"content":", world  \n"}}
        ]}"#;
        assert_eq!(parse_completion_body(body).unwrap().text, "Hello, world");
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let result = parse_completion_body(r#"{"choices":[]}"#).unwrap();
        assert!(!result.id.is_empty());
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_non_object_body_yields_empty_text() {
        let result = parse_completion_body("[1,2,3]").unwrap();
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(parse_completion_body("<html>bad gateway</html>").is_err());
    }
}
