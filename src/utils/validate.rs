//! Input validation for filters, conversations and search arguments.
//!
//! Everything here runs before any request body is built; a failure never
//! reaches the network.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{
    ConversationMessage, DateRange, DomainFilter, FilterArgs, FilterSet, TemporalFilter,
};

/// Validation error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Validation error: {field} must be in M/D/YYYY format, got '{value}'")]
    BadDateFormat { field: &'static str, value: String },

    #[error("Validation error: search_recency_filter cannot be combined with date filters")]
    ConflictingFilters,

    #[error("Validation error: search_domain_filter accepts at most 20 entries, got {count}")]
    TooManyDomains { count: usize },

    #[error("Validation error: search_domain_filter cannot mix excluded ('-' prefixed) and included domains")]
    MixedDomainMode,

    #[error("Validation error: at most 5 queries per search, got {count}")]
    TooManyQueries { count: usize },

    #[error("Validation error: query must not be empty")]
    EmptyQuery,

    #[error("Validation error: {field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u64,
    },

    #[error("Validation error: country must be an ISO 3166-1 alpha-2 code, got '{0}'")]
    InvalidCountry(String),

    #[error("Validation error: invalid messages: {0}")]
    InvalidMessages(String),

    #[error("Validation error: invalid arguments: {0}")]
    InvalidArguments(String),
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(0?[1-9]|1[0-2])/(0?[1-9]|[12][0-9]|3[01])/[0-9]{4}$")
            .expect("date pattern is valid")
    })
}

/// Whether `value` is a filter date in strict `M/D/YYYY` form.
///
/// Month 1-12 and day 1-31 with one or two digits, four-digit year. Calendar
/// validity (e.g. `2/31`) is left to the upstream service.
pub fn is_valid_filter_date(value: &str) -> bool {
    date_pattern().is_match(value)
}

/// Turn raw filter arguments into a [`FilterSet`].
///
/// Checks run in a fixed order: date formats, recency/date conflict, domain
/// count, domain mode.
pub fn validate_filters(args: FilterArgs) -> Result<FilterSet, ValidationError> {
    let has_dates = args.has_dates();
    let range = DateRange::new(
        args.search_after_date,
        args.search_before_date,
        args.last_updated_after,
        args.last_updated_before,
    )?;

    let temporal = match (args.recency, range) {
        (Some(_), _) if has_dates => return Err(ValidationError::ConflictingFilters),
        (Some(recency), _) => Some(TemporalFilter::Recency(recency)),
        (None, Some(range)) => Some(TemporalFilter::DateRange(range)),
        (None, None) => None,
    };

    let domains = match args.domain_filter {
        Some(entries) => DomainFilter::from_entries(entries)?,
        None => None,
    };

    Ok(FilterSet::new(temporal, domains))
}

/// Check a conversation: at least one message, none with blank content.
pub fn validate_messages(messages: &[ConversationMessage]) -> Result<(), ValidationError> {
    if messages.is_empty() {
        return Err(ValidationError::InvalidMessages(
            "at least one message is required".to_string(),
        ));
    }

    if let Some(index) = messages.iter().position(|m| m.content.trim().is_empty()) {
        return Err(ValidationError::InvalidMessages(format!(
            "message {} has empty content",
            index
        )));
    }

    Ok(())
}

/// Check an integer argument against an inclusive range
pub fn check_range(
    field: &'static str,
    value: u64,
    min: u32,
    max: u32,
) -> Result<u32, ValidationError> {
    if (u64::from(min)..=u64::from(max)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

/// Normalize an ISO 3166-1 alpha-2 country code to upper case
pub fn validate_country(country: &str) -> Result<String, ValidationError> {
    let trimmed = country.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(ValidationError::InvalidCountry(country.to_string()))
    }
}
