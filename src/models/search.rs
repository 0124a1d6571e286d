//! Search request and response models.

use serde::{Deserialize, Serialize};

/// Default number of results
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Default token budget extracted per page
pub const DEFAULT_MAX_TOKENS_PER_PAGE: u32 = 1024;

/// Maximum number of queries submitted in one batch
pub const MAX_BATCH_QUERIES: usize = 5;

/// A single query or a batch of queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchQuery {
    Single(String),
    Batch(Vec<String>),
}

impl SearchQuery {
    /// Number of query strings
    pub fn len(&self) -> usize {
        match self {
            SearchQuery::Single(_) => 1,
            SearchQuery::Batch(queries) => queries.len(),
        }
    }

    /// Whether there is nothing to search for
    pub fn is_empty(&self) -> bool {
        match self {
            SearchQuery::Single(query) => query.trim().is_empty(),
            SearchQuery::Batch(queries) => queries.iter().all(|q| q.trim().is_empty()),
        }
    }

    /// Whether any query string is blank. An empty batch counts as blank.
    pub fn has_blank(&self) -> bool {
        match self {
            SearchQuery::Single(query) => query.trim().is_empty(),
            SearchQuery::Batch(queries) => {
                queries.is_empty() || queries.iter().any(|q| q.trim().is_empty())
            }
        }
    }
}

impl From<&str> for SearchQuery {
    fn from(query: &str) -> Self {
        SearchQuery::Single(query.to_string())
    }
}

impl From<String> for SearchQuery {
    fn from(query: String) -> Self {
        SearchQuery::Single(query)
    }
}

impl From<Vec<String>> for SearchQuery {
    fn from(queries: Vec<String>) -> Self {
        SearchQuery::Batch(queries)
    }
}

/// Search parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query or batch of queries
    pub query: SearchQuery,

    /// Number of results, 1-20
    #[serde(default = "default_max_results")]
    pub max_results: u64,

    /// Tokens extracted per result page, 256-2048
    #[serde(default = "default_max_tokens_per_page")]
    pub max_tokens_per_page: u64,

    /// ISO 3166-1 alpha-2 country code
    #[serde(default)]
    pub country: Option<String>,
}

fn default_max_results() -> u64 {
    u64::from(DEFAULT_MAX_RESULTS)
}

fn default_max_tokens_per_page() -> u64 {
    u64::from(DEFAULT_MAX_TOKENS_PER_PAGE)
}

impl SearchRequest {
    /// Create a request with default limits
    pub fn new(query: impl Into<SearchQuery>) -> Self {
        Self {
            query: query.into(),
            max_results: default_max_results(),
            max_tokens_per_page: default_max_tokens_per_page(),
            country: None,
        }
    }

    /// Set maximum results
    pub fn max_results(mut self, max: u64) -> Self {
        self.max_results = max;
        self
    }

    /// Set per-page token budget
    pub fn max_tokens_per_page(mut self, max: u64) -> Self {
        self.max_tokens_per_page = max;
        self
    }

    /// Restrict to a country
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

/// Body POSTed to `/search`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchBody<'a> {
    pub query: &'a SearchQuery,
    pub max_results: u32,
    pub max_tokens_per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default, alias = "date")]
    pub published_date: Option<String>,
    #[serde(default, alias = "last_updated")]
    pub last_updated_date: Option<String>,
}

impl SearchResult {
    /// Create a result with only title and URL
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: None,
            published_date: None,
            last_updated_date: None,
        }
    }
}

/// Validated search payload; results keep the upstream relevance order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    /// Format results as numbered markdown-ish text
    pub fn render(&self) -> String {
        if self.results.is_empty() {
            return "No search results found.".to_string();
        }

        let mut out = format!("Found {} search results:\n\n", self.results.len());
        for (i, result) in self.results.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, result.title));
            out.push_str(&format!("   URL: {}\n", result.url));
            if let Some(snippet) = result.snippet.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!("   {}\n", snippet));
            }
            if let Some(date) = result.published_date.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!("   Published: {}\n", date));
            }
            if let Some(date) = result.last_updated_date.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&format!("   Last updated: {}\n", date));
            }
            out.push('\n');
        }
        out
    }
}
