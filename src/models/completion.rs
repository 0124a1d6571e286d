//! Chat completion request and response models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filters::{DateField, DomainFilter, FilterSet, TemporalFilter};
use super::message::ConversationMessage;

/// Model behind the ask tool
pub const ASK_MODEL: &str = "sonar-pro";

/// Model behind the reason tool
pub const REASON_MODEL: &str = "sonar-reasoning-pro";

/// Model behind the research tool; the only one answered as an event stream
pub const DEEP_RESEARCH_MODEL: &str = "sonar-deep-research";

/// Whether `model` must be requested in streaming mode
pub fn requires_streaming(model: &str) -> bool {
    model == DEEP_RESEARCH_MODEL
}

/// Reasoning effort for the deep research model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

/// Amount of web context retrieved for an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

/// One ask/research/reason call, built fresh per invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ConversationMessage>,
    pub model: String,
    pub filters: FilterSet,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub search_context_size: Option<SearchContextSize>,
    pub strip_thinking: bool,
}

impl CompletionRequest {
    /// Create a request with no filters or options
    pub fn new(model: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            messages,
            model: model.into(),
            filters: FilterSet::none(),
            reasoning_effort: None,
            search_context_size: None,
            strip_thinking: false,
        }
    }

    /// Set validated filters
    pub fn filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Set reasoning effort
    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Set search context size
    pub fn search_context_size(mut self, size: SearchContextSize) -> Self {
        self.search_context_size = Some(size);
        self
    }

    /// Remove `<think>` spans from the answer
    pub fn strip_thinking(mut self, strip: bool) -> Self {
        self.strip_thinking = strip;
        self
    }

    /// Whether this request is answered as an event stream
    pub fn is_streaming(&self) -> bool {
        requires_streaming(&self.model)
    }
}

/// Nested `web_search_options` object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSearchOptions {
    pub search_context_size: SearchContextSize,
}

/// Body POSTed to `/chat/completions`. Unset options are omitted, never null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionBody<'a> {
    pub model: &'a str,
    pub messages: &'a [ConversationMessage],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_recency_filter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after_date_filter: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_before_date_filter: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_after_filter: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_before_filter: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_domain_filter: Option<&'a [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl<'a> ChatCompletionBody<'a> {
    /// Build the outbound body for a request
    pub fn from_request(request: &'a CompletionRequest) -> Self {
        let mut body = Self {
            model: &request.model,
            messages: &request.messages,
            stream: request.is_streaming().then_some(true),
            search_recency_filter: None,
            search_after_date_filter: None,
            search_before_date_filter: None,
            last_updated_after_filter: None,
            last_updated_before_filter: None,
            search_domain_filter: request.filters.domains().map(DomainFilter::entries),
            web_search_options: request
                .search_context_size
                .map(|search_context_size| WebSearchOptions { search_context_size }),
            reasoning_effort: request.reasoning_effort,
        };

        match request.filters.temporal() {
            Some(TemporalFilter::Recency(recency)) => {
                body.search_recency_filter = Some(recency.to_string());
            }
            Some(TemporalFilter::DateRange(range)) => {
                body.search_after_date_filter = range.get(DateField::SearchAfter);
                body.search_before_date_filter = range.get(DateField::SearchBefore);
                body.last_updated_after_filter = range.get(DateField::LastUpdatedAfter);
                body.last_updated_before_filter = range.get(DateField::LastUpdatedBefore);
            }
            None => {}
        }

        body
    }
}

/// Assistant message inside a choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: String,
}

/// One completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Validated chat completion payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
    #[serde(default)]
    pub usage: Option<Value>,
}

impl ChatCompletionResponse {
    /// Content of the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Final answer text plus its sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResult {
    pub text: String,
    pub citations: Vec<String>,
}

impl CompletionResult {
    /// Text with a numbered citation block appended when there are citations
    pub fn render(&self) -> String {
        if self.citations.is_empty() {
            return self.text.clone();
        }

        let mut out = String::with_capacity(self.text.len() + 16 + self.citations.len() * 32);
        out.push_str(&self.text);
        out.push_str("\n\nCitations:\n");
        for (i, url) in self.citations.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", i + 1, url));
        }
        out
    }
}
