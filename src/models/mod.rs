//! Core data models for conversations, filters, completions and search.

mod completion;
mod filters;
mod message;
mod schema;
mod search;

pub use completion::{
    requires_streaming, ChatCompletionBody, ChatCompletionResponse, Choice, ChoiceMessage,
    CompletionRequest, CompletionResult, ReasoningEffort, SearchContextSize, WebSearchOptions,
    ASK_MODEL, DEEP_RESEARCH_MODEL, REASON_MODEL,
};
pub use filters::{
    DateField, DateRange, DomainFilter, FilterArgs, FilterCapabilities, FilterSet, Recency,
    TemporalFilter, MAX_DOMAIN_FILTERS,
};
pub use message::{ConversationMessage, Role};
pub use schema::{validate_completion, validate_search, SchemaError};
pub use search::{
    SearchBody, SearchQuery, SearchRequest, SearchResponse, SearchResult,
    DEFAULT_MAX_RESULTS, DEFAULT_MAX_TOKENS_PER_PAGE, MAX_BATCH_QUERIES,
};
