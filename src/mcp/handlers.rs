//! Tool handlers: decode arguments, call an engine, shape the result.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tools::ToolHandler;
use crate::engine::{CompletionEngine, EngineError, SearchEngine};
use crate::models::{
    CompletionRequest, ConversationMessage, FilterArgs, FilterCapabilities, ReasoningEffort,
    SearchContextSize, SearchRequest,
};
use crate::utils::ValidationError;

/// Arguments shared by the ask, research and reason tools
#[derive(Debug, Deserialize)]
struct CompletionArgs {
    messages: Vec<ConversationMessage>,

    #[serde(default)]
    strip_thinking: Option<bool>,

    #[serde(default)]
    reasoning_effort: Option<ReasoningEffort>,

    #[serde(default)]
    search_context_size: Option<SearchContextSize>,

    #[serde(flatten)]
    filters: FilterArgs,
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T, EngineError> {
    serde_json::from_value(args)
        .map_err(|e| EngineError::from(ValidationError::InvalidArguments(e.to_string())))
}

/// Successful tool output: one text block plus the same text keyed by `key`
pub fn tool_output(key: &str, text: String) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "structuredContent": {key: text},
        "isError": false
    })
}

/// Failed tool output carrying the error message as its only text block
pub fn tool_error(message: String) -> Value {
    json!({
        "content": [{"type": "text", "text": message}],
        "isError": true
    })
}

fn to_tool_error(tool: &str, err: EngineError) -> String {
    tracing::warn!("{} failed ({}): {}", tool, err.kind(), err);
    err.to_string()
}

/// Handler for one chat completion model
#[derive(Debug, Clone)]
pub struct CompletionToolHandler {
    pub engine: CompletionEngine,
    pub tool: &'static str,
    pub model: &'static str,
    pub capabilities: FilterCapabilities,
}

impl CompletionToolHandler {
    async fn run(&self, args: Value) -> Result<String, EngineError> {
        let args: CompletionArgs = decode(args)?;

        let mut request = CompletionRequest::new(self.model, args.messages)
            .strip_thinking(args.strip_thinking.unwrap_or(false));
        if let Some(effort) = args.reasoning_effort {
            if self.capabilities.contains(FilterCapabilities::REASONING_EFFORT) {
                request = request.reasoning_effort(effort);
            }
        }
        if let Some(size) = args.search_context_size {
            if self.capabilities.contains(FilterCapabilities::CONTEXT_SIZE) {
                request = request.search_context_size(size);
            }
        }

        let filters = args.filters.restrict(self.capabilities);
        self.engine.complete_filtered(request, filters).await
    }
}

#[async_trait::async_trait]
impl ToolHandler for CompletionToolHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        match self.run(args).await {
            Ok(text) => Ok(tool_output("response", text)),
            Err(e) => Err(to_tool_error(self.tool, e)),
        }
    }
}

/// Handler for the search tool
#[derive(Debug, Clone)]
pub struct SearchToolHandler {
    pub engine: SearchEngine,
}

#[async_trait::async_trait]
impl ToolHandler for SearchToolHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let result = match decode::<SearchRequest>(args) {
            Ok(request) => self.engine.search(request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => Ok(tool_output("results", text)),
            Err(e) => Err(to_tool_error("perplexity_search", e)),
        }
    }
}
