//! Search engine for the search tool.

use std::sync::Arc;

use super::EngineError;
use crate::config::ConfigProvider;
use crate::models::{
    validate_search, SchemaError, SearchBody, SearchRequest, SearchResponse, MAX_BATCH_QUERIES,
};
use crate::utils::{check_range, validate_country, DispatchError, Dispatcher, ValidationError};

/// Path of the search endpoint, relative to the base URL
pub const SEARCH_PATH: &str = "/search";

/// Runs one ranked web search
#[derive(Debug, Clone)]
pub struct SearchEngine {
    dispatcher: Dispatcher,
}

impl SearchEngine {
    /// Create an engine over a configuration provider
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Search and format the results as numbered text
    pub async fn search(&self, request: SearchRequest) -> Result<String, EngineError> {
        Ok(self.fetch(&request).await?.render())
    }

    /// Search and return the validated results
    pub async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, EngineError> {
        let body = build_body(request)?;

        tracing::info!(
            "Searching {} quer{} (max_results={})",
            request.query.len(),
            if request.query.len() == 1 { "y" } else { "ies" },
            body.max_results
        );

        let response = self
            .dispatcher
            .post_json(SEARCH_PATH, &body, |resp| async move {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| EngineError::from(DispatchError::network(&e)))?;
                let json = serde_json::from_slice(&bytes).map_err(SchemaError::from)?;
                Ok::<_, EngineError>(validate_search(json)?)
            })
            .await?;

        tracing::debug!("Search returned {} results", response.results.len());
        Ok(response)
    }
}

fn build_body(request: &SearchRequest) -> Result<SearchBody<'_>, ValidationError> {
    if request.query.has_blank() {
        return Err(ValidationError::EmptyQuery);
    }
    if request.query.len() > MAX_BATCH_QUERIES {
        return Err(ValidationError::TooManyQueries {
            count: request.query.len(),
        });
    }

    Ok(SearchBody {
        query: &request.query,
        max_results: check_range("max_results", request.max_results, 1, 20)?,
        max_tokens_per_page: check_range(
            "max_tokens_per_page",
            request.max_tokens_per_page,
            256,
            2048,
        )?,
        country: request.country.as_deref().map(validate_country).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use mockito::Matcher;
    use serde_json::json;

    fn engine(base_url: &str) -> SearchEngine {
        SearchEngine::new(Arc::new(Settings::new("test-key", base_url)))
    }

    #[test]
    fn test_body_defaults_and_country() {
        let request = SearchRequest::new("rust").country("de");
        let body = serde_json::to_value(build_body(&request).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "query": "rust",
                "max_results": 10,
                "max_tokens_per_page": 1024,
                "country": "DE"
            })
        );
    }

    #[test]
    fn test_body_omits_country() {
        let request = SearchRequest::new("rust");
        let body = serde_json::to_value(build_body(&request).unwrap()).unwrap();
        assert!(body.get("country").is_none());
    }

    #[test]
    fn test_body_rejects_bad_arguments() {
        assert_eq!(
            build_body(&SearchRequest::new("  ")),
            Err(ValidationError::EmptyQuery)
        );

        let six: Vec<String> = (0..6).map(|i| format!("q{i}")).collect();
        assert_eq!(
            build_body(&SearchRequest::new(six)),
            Err(ValidationError::TooManyQueries { count: 6 })
        );

        assert!(matches!(
            build_body(&SearchRequest::new("q").max_results(21)),
            Err(ValidationError::OutOfRange { field: "max_results", .. })
        ));
        assert!(matches!(
            build_body(&SearchRequest::new("q").max_tokens_per_page(100)),
            Err(ValidationError::OutOfRange { field: "max_tokens_per_page", .. })
        ));
        assert!(matches!(
            build_body(&SearchRequest::new("q").country("USA")),
            Err(ValidationError::InvalidCountry(_))
        ));
    }

    #[tokio::test]
    async fn test_search_formats_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::Json(json!({
                "query": ["a", "b"],
                "max_results": 3,
                "max_tokens_per_page": 1024
            })))
            .with_status(200)
            .with_body(
                json!({"results": [{"title": "T", "url": "U", "snippet": "S", "date": "2025-01-02"}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let request = SearchRequest::new(vec!["a".to_string(), "b".to_string()]).max_results(3);
        let text = engine(&server.url()).search(request).await.unwrap();

        assert_eq!(
            text,
            "Found 1 search results:\n\n1. **T**\n   URL: U\n   S\n   Published: 2025-01-02\n\n"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_empty_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let text = engine(&server.url())
            .search(SearchRequest::new("nothing"))
            .await
            .unwrap();
        assert_eq!(text, "No search results found.");
    }

    #[tokio::test]
    async fn test_batch_of_six_never_dispatched() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/search").expect(0).create_async().await;

        let six: Vec<String> = (0..6).map(|i| format!("q{i}")).collect();
        let result = engine(&server.url()).search(SearchRequest::new(six)).await;

        assert_eq!(
            result,
            Err(EngineError::Validation(ValidationError::TooManyQueries { count: 6 }))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_with_blank_entry_never_dispatched() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/search").expect(0).create_async().await;

        let batch = vec!["rust".to_string(), "".to_string()];
        let result = engine(&server.url()).search(SearchRequest::new(batch)).await;

        assert_eq!(
            result,
            Err(EngineError::Validation(ValidationError::EmptyQuery))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let err = engine(&server.url())
            .search(SearchRequest::new("q"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("internal"));
    }
}
