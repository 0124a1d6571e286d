//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::handlers::{CompletionToolHandler, SearchToolHandler};
use crate::engine::Engines;
use crate::models::{
    FilterCapabilities, ASK_MODEL, DEEP_RESEARCH_MODEL, MAX_BATCH_QUERIES, MAX_DOMAIN_FILTERS,
    REASON_MODEL,
};

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "perplexity_ask")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Filters and options accepted by ask and reason
const WEB_ANSWER_CAPABILITIES: FilterCapabilities = FilterCapabilities::RECENCY
    .union(FilterCapabilities::DATE_RANGE)
    .union(FilterCapabilities::DOMAIN)
    .union(FilterCapabilities::CONTEXT_SIZE);

/// Input schema for a completion tool accepting `capabilities`
fn completion_schema(capabilities: FilterCapabilities) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "messages".to_string(),
        json!({
            "type": "array",
            "description": "Conversation so far, oldest first",
            "items": {
                "type": "object",
                "properties": {
                    "role": {"type": "string", "enum": ["system", "user", "assistant"]},
                    "content": {"type": "string"}
                },
                "required": ["role", "content"]
            }
        }),
    );
    properties.insert(
        "strip_thinking".to_string(),
        json!({
            "type": "boolean",
            "description": "Remove <think>...</think> reasoning from the answer",
            "default": false
        }),
    );

    if capabilities.contains(FilterCapabilities::RECENCY) {
        properties.insert(
            "search_recency_filter".to_string(),
            json!({
                "type": "string",
                "description": "Only use sources from this recent window. Cannot be combined with date filters.",
                "enum": ["hour", "day", "week", "month", "year"]
            }),
        );
    }

    if capabilities.contains(FilterCapabilities::DATE_RANGE) {
        for (name, description) in [
            ("search_after_date_filter", "Only sources published after this date (M/D/YYYY)"),
            ("search_before_date_filter", "Only sources published before this date (M/D/YYYY)"),
            ("last_updated_after_filter", "Only sources updated after this date (M/D/YYYY)"),
            ("last_updated_before_filter", "Only sources updated before this date (M/D/YYYY)"),
        ] {
            properties.insert(
                name.to_string(),
                json!({"type": "string", "description": description}),
            );
        }
    }

    if capabilities.contains(FilterCapabilities::DOMAIN) {
        properties.insert(
            "search_domain_filter".to_string(),
            json!({
                "type": "array",
                "description": "Domains or URLs to include, or to exclude when every entry starts with '-'",
                "items": {"type": "string"},
                "maxItems": MAX_DOMAIN_FILTERS
            }),
        );
    }

    if capabilities.contains(FilterCapabilities::CONTEXT_SIZE) {
        properties.insert(
            "search_context_size".to_string(),
            json!({
                "type": "string",
                "description": "How much web context to retrieve",
                "enum": ["low", "medium", "high"]
            }),
        );
    }

    if capabilities.contains(FilterCapabilities::REASONING_EFFORT) {
        properties.insert(
            "reasoning_effort".to_string(),
            json!({
                "type": "string",
                "description": "Research depth",
                "enum": ["minimal", "low", "medium", "high"]
            }),
        );
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": ["messages"]
    })
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a registry with the ask, research, reason and search tools
    pub fn new(engines: &Engines) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        registry.register_completion_tool(
            engines,
            "perplexity_ask",
            "Ask a question and get a web-grounded answer with numbered citations.",
            ASK_MODEL,
            WEB_ANSWER_CAPABILITIES,
        );
        registry.register_completion_tool(
            engines,
            "perplexity_research",
            "Run an in-depth, multi-source research report. Slow; use for thorough investigation.",
            DEEP_RESEARCH_MODEL,
            FilterCapabilities::REASONING_EFFORT,
        );
        registry.register_completion_tool(
            engines,
            "perplexity_reason",
            "Work through a problem step by step with web-grounded reasoning.",
            REASON_MODEL,
            WEB_ANSWER_CAPABILITIES,
        );

        registry.register(Tool {
            name: "perplexity_search".to_string(),
            description: "Search the web and get ranked results with titles, URLs and snippets."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "description": "Search query, or up to 5 queries to run together",
                        "oneOf": [
                            {"type": "string"},
                            {"type": "array", "items": {"type": "string"}, "maxItems": MAX_BATCH_QUERIES}
                        ]
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Number of results",
                        "minimum": 1,
                        "maximum": 20,
                        "default": 10
                    },
                    "max_tokens_per_page": {
                        "type": "integer",
                        "description": "Content extracted per result page",
                        "minimum": 256,
                        "maximum": 2048,
                        "default": 1024
                    },
                    "country": {
                        "type": "string",
                        "description": "ISO 3166-1 alpha-2 country code (e.g., 'US', 'DE')"
                    }
                },
                "required": ["query"]
            }),
            handler: Arc::new(SearchToolHandler {
                engine: engines.search.clone(),
            }),
        });

        registry
    }

    fn register_completion_tool(
        &mut self,
        engines: &Engines,
        name: &'static str,
        description: &str,
        model: &'static str,
        capabilities: FilterCapabilities,
    ) {
        self.register(Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: completion_schema(capabilities),
            handler: Arc::new(CompletionToolHandler {
                engine: engines.completion.clone(),
                tool: name,
                model,
                capabilities,
            }),
        });
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools
    pub fn all(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}
