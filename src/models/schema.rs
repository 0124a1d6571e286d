//! Shape checks for upstream JSON payloads.
//!
//! Checks are strict about the paths the engines read and ignore every other
//! field.

use serde::Deserialize;
use serde_json::Value;

use super::completion::ChatCompletionResponse;
use super::search::{SearchResponse, SearchResult};

/// Upstream payload did not have the expected shape
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema error: response contained no choices")]
    EmptyChoices,

    #[error("Schema error: choices[0].message.content is missing or not a string")]
    MissingContent,

    #[error("Schema error: citation {index} is not a string")]
    InvalidCitation { index: usize },

    #[error("Schema error: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Malformed(format!("JSON: {}", err))
    }
}

/// Validate a chat completion body.
pub fn validate_completion(json: Value) -> Result<ChatCompletionResponse, SchemaError> {
    let object = json
        .as_object()
        .ok_or_else(|| SchemaError::Malformed("completion body is not an object".to_string()))?;

    let choices = object
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::Malformed("'choices' is missing or not a list".to_string()))?;

    let first = choices.first().ok_or(SchemaError::EmptyChoices)?;
    if !first
        .pointer("/message/content")
        .is_some_and(Value::is_string)
    {
        return Err(SchemaError::MissingContent);
    }

    if let Some(citations) = object.get("citations").filter(|c| !c.is_null()) {
        let list = citations
            .as_array()
            .ok_or_else(|| SchemaError::Malformed("'citations' is not a list".to_string()))?;
        if let Some(index) = list.iter().position(|c| !c.is_string()) {
            return Err(SchemaError::InvalidCitation { index });
        }
    }

    Ok(serde_json::from_value(json)?)
}

/// Validate a search body. A missing or non-list `results` is zero results.
pub fn validate_search(json: Value) -> Result<SearchResponse, SchemaError> {
    let id = json.get("id").and_then(Value::as_str).map(str::to_string);

    let results = match json.get("results").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                SearchResult::deserialize(item)
                    .map_err(|e| SchemaError::Malformed(format!("results[{}]: {}", i, e)))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(SearchResponse { id, results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_choices() {
        assert_eq!(
            validate_completion(json!({"choices": []})),
            Err(SchemaError::EmptyChoices)
        );
    }

    #[test]
    fn test_missing_content() {
        assert_eq!(
            validate_completion(json!({"choices": [{"message": {}}]})),
            Err(SchemaError::MissingContent)
        );
        assert_eq!(
            validate_completion(json!({"choices": [{"message": {"content": 42}}]})),
            Err(SchemaError::MissingContent)
        );
    }

    #[test]
    fn test_missing_choices_is_malformed() {
        assert!(matches!(
            validate_completion(json!({"id": "x"})),
            Err(SchemaError::Malformed(_))
        ));
        assert!(matches!(
            validate_completion(json!("text")),
            Err(SchemaError::Malformed(_))
        ));
    }

    #[test]
    fn test_valid_completion_ignores_unknown_fields() {
        let response = validate_completion(json!({
            "id": "abc",
            "model": "sonar-pro",
            "created": 1700000000,
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi"},
                "finish_reason": "stop",
                "delta": {"ignored": true}
            }],
            "citations": ["https://a.example"],
            "search_results": [{"title": "x"}]
        }))
        .unwrap();

        assert_eq!(response.content(), Some("Hi"));
        assert_eq!(response.id.as_deref(), Some("abc"));
        assert_eq!(response.citations, Some(vec!["https://a.example".to_string()]));
    }

    #[test]
    fn test_empty_string_content_is_valid() {
        let response = validate_completion(json!({"choices": [{"message": {"content": ""}}]}));
        assert_eq!(response.unwrap().content(), Some(""));
    }

    #[test]
    fn test_non_string_citation_rejected() {
        assert_eq!(
            validate_completion(json!({
                "choices": [{"message": {"content": "x"}}],
                "citations": ["https://ok.example", {"url": "https://bad.example"}]
            })),
            Err(SchemaError::InvalidCitation { index: 1 })
        );
    }

    #[test]
    fn test_null_citations_allowed() {
        let response = validate_completion(json!({
            "choices": [{"message": {"content": "x"}}],
            "citations": null
        }))
        .unwrap();
        assert!(response.citations.is_none());
    }

    #[test]
    fn test_search_empty_object() {
        let response = validate_search(json!({})).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_search_non_list_results() {
        let response = validate_search(json!({"results": "nope"})).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_search_results_in_order() {
        let response = validate_search(json!({
            "id": "s1",
            "results": [
                {"title": "B", "url": "https://b"},
                {"title": "A", "url": "https://a", "snippet": "s"}
            ]
        }))
        .unwrap();

        let titles: Vec<_> = response.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
        assert_eq!(response.id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_search_result_without_url_is_malformed() {
        assert!(matches!(
            validate_search(json!({"results": [{"title": "x"}]})),
            Err(SchemaError::Malformed(msg)) if msg.starts_with("results[0]")
        ));
    }
}
