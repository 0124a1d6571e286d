//! Completion engine for the ask, reason and deep research tools.

use futures_util::StreamExt;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::EngineError;
use crate::config::ConfigProvider;
use crate::models::{
    validate_completion, ChatCompletionBody, CompletionRequest, CompletionResult, FilterArgs,
    SchemaError,
};
use crate::utils::{assemble, validate_filters, validate_messages, DispatchError, Dispatcher};

/// Path of the chat completions endpoint, relative to the base URL
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

fn thinking_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<think>.*?</think>").expect("thinking pattern is valid")
    })
}

/// Remove every `<think>...</think>` span, then trim the result
pub fn strip_thinking(text: &str) -> String {
    thinking_pattern().replace_all(text, "").trim().to_string()
}

/// Runs one chat completion end to end
#[derive(Debug, Clone)]
pub struct CompletionEngine {
    dispatcher: Dispatcher,
}

impl CompletionEngine {
    /// Create an engine over a configuration provider
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Validate raw filter arguments, then complete.
    ///
    /// Filter errors are returned before anything is sent.
    pub async fn complete_filtered(
        &self,
        request: CompletionRequest,
        filters: FilterArgs,
    ) -> Result<String, EngineError> {
        let filters = validate_filters(filters)?;
        self.complete(request.filters(filters)).await
    }

    /// Answer text with the citation block appended
    pub async fn complete(&self, request: CompletionRequest) -> Result<String, EngineError> {
        Ok(self.fetch(&request).await?.render())
    }

    /// Answer text and citations, kept apart
    pub async fn fetch(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, EngineError> {
        validate_messages(&request.messages)?;

        let body = ChatCompletionBody::from_request(request);
        let streaming = request.is_streaming();

        tracing::info!(
            "Requesting completion from {} ({} messages, {})",
            request.model,
            request.messages.len(),
            if streaming { "streaming" } else { "buffered" }
        );

        let response = self
            .dispatcher
            .post_json(CHAT_COMPLETIONS_PATH, &body, |resp| async move {
                if streaming {
                    let chunks = resp.bytes_stream().map(|chunk| {
                        chunk.map_err(|e| EngineError::from(DispatchError::network(&e)))
                    });
                    assemble(Box::pin(chunks)).await
                } else {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| EngineError::from(DispatchError::network(&e)))?;
                    let json = serde_json::from_slice(&bytes).map_err(SchemaError::from)?;
                    Ok(validate_completion(json)?)
                }
            })
            .await?;

        let content = response.content().ok_or(SchemaError::EmptyChoices)?;
        let text = if request.strip_thinking {
            strip_thinking(content)
        } else {
            content.to_string()
        };
        let citations = response.citations.unwrap_or_default();

        tracing::debug!(
            "Completion from {} returned {} chars, {} citations",
            request.model,
            text.len(),
            citations.len()
        );

        Ok(CompletionResult { text, citations })
    }
}
