//! Engines that turn one tool call into one upstream request.
//!
//! - [`CompletionEngine`]: ask, reason and deep research over `/chat/completions`
//! - [`SearchEngine`]: ranked web results over `/search`
//!
//! Both report failures as [`EngineError`], which keeps the classification of
//! the layer that failed. Nothing is retried here.

mod completion;
mod search;

pub use completion::{strip_thinking, CompletionEngine, CHAT_COMPLETIONS_PATH};
pub use search::{SearchEngine, SEARCH_PATH};

use std::sync::Arc;

use crate::config::{ConfigError, ConfigProvider};
use crate::models::SchemaError;
use crate::utils::{DispatchError, ValidationError};

/// Classified failure of an engine call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Config(String),
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl EngineError {
    /// Short classification label
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Dispatch(DispatchError::Timeout { .. }) => "timeout",
            EngineError::Dispatch(DispatchError::Upstream { .. }) => "upstream",
            EngineError::Dispatch(_) => "network",
            EngineError::Schema(_) => "schema",
            EngineError::Config(_) => "config",
        }
    }
}

/// Both engines over one configuration provider
#[derive(Debug, Clone)]
pub struct Engines {
    pub completion: CompletionEngine,
    pub search: SearchEngine,
}

impl Engines {
    /// Create both engines sharing `config`
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            completion: CompletionEngine::new(config.clone()),
            search: SearchEngine::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            EngineError::from(ValidationError::ConflictingFilters).kind(),
            "validation"
        );
        assert_eq!(
            EngineError::from(DispatchError::Timeout { timeout_ms: 1 }).kind(),
            "timeout"
        );
        assert_eq!(EngineError::from(SchemaError::EmptyChoices).kind(), "schema");
        assert_eq!(EngineError::from(ConfigError::MissingApiKey).kind(), "config");
    }

    #[test]
    fn test_messages_pass_through() {
        let err = EngineError::from(DispatchError::Timeout { timeout_ms: 300000 });
        assert_eq!(
            err.to_string(),
            "Timeout error: request did not complete within 300000ms"
        );

        let err = EngineError::from(ConfigError::MissingApiKey);
        assert!(err.to_string().contains("PERPLEXITY_API_KEY"));
    }
}
