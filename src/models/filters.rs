//! Search filter models.
//!
//! [`FilterArgs`] is the loose shape tool callers send. Validation turns it into
//! a [`FilterSet`], where the recency/date-range exclusion and the uniform
//! domain mode are properties of the types themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{is_valid_filter_date, ValidationError};

/// Maximum number of entries in a domain filter
pub const MAX_DOMAIN_FILTERS: usize = 20;

bitflags::bitflags! {
    /// Filter categories a tool accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FilterCapabilities: u32 {
        const RECENCY = 1 << 0;
        const DATE_RANGE = 1 << 1;
        const DOMAIN = 1 << 2;
        const CONTEXT_SIZE = 1 << 3;
        const REASONING_EFFORT = 1 << 4;
    }
}

/// Coarse relative time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recency::Hour => "hour",
            Recency::Day => "day",
            Recency::Week => "week",
            Recency::Month => "month",
            Recency::Year => "year",
        };
        f.write_str(s)
    }
}

/// Which date field of a [`DateRange`] a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    SearchAfter,
    SearchBefore,
    LastUpdatedAfter,
    LastUpdatedBefore,
}

impl DateField {
    /// Wire/argument name of the field
    pub fn name(&self) -> &'static str {
        match self {
            DateField::SearchAfter => "search_after_date_filter",
            DateField::SearchBefore => "search_before_date_filter",
            DateField::LastUpdatedAfter => "last_updated_after_filter",
            DateField::LastUpdatedBefore => "last_updated_before_filter",
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Explicit calendar bounds, every present value in `M/D/YYYY` form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    search_after: Option<String>,
    search_before: Option<String>,
    last_updated_after: Option<String>,
    last_updated_before: Option<String>,
}

impl DateRange {
    /// Build a range, checking every supplied date.
    ///
    /// Returns `Ok(None)` when no bound is supplied.
    pub fn new(
        search_after: Option<String>,
        search_before: Option<String>,
        last_updated_after: Option<String>,
        last_updated_before: Option<String>,
    ) -> Result<Option<Self>, ValidationError> {
        let range = Self {
            search_after: check_date(DateField::SearchAfter, search_after)?,
            search_before: check_date(DateField::SearchBefore, search_before)?,
            last_updated_after: check_date(DateField::LastUpdatedAfter, last_updated_after)?,
            last_updated_before: check_date(DateField::LastUpdatedBefore, last_updated_before)?,
        };

        Ok(if range.is_empty() { None } else { Some(range) })
    }

    fn is_empty(&self) -> bool {
        self.search_after.is_none()
            && self.search_before.is_none()
            && self.last_updated_after.is_none()
            && self.last_updated_before.is_none()
    }

    /// Value of one bound
    pub fn get(&self, field: DateField) -> Option<&str> {
        match field {
            DateField::SearchAfter => self.search_after.as_deref(),
            DateField::SearchBefore => self.search_before.as_deref(),
            DateField::LastUpdatedAfter => self.last_updated_after.as_deref(),
            DateField::LastUpdatedBefore => self.last_updated_before.as_deref(),
        }
    }

    /// Present bounds with their field names, in a fixed order
    pub fn bounds(&self) -> impl Iterator<Item = (DateField, &str)> {
        [
            DateField::SearchAfter,
            DateField::SearchBefore,
            DateField::LastUpdatedAfter,
            DateField::LastUpdatedBefore,
        ]
        .into_iter()
        .filter_map(move |field| self.get(field).map(|value| (field, value)))
    }
}

fn check_date(field: DateField, value: Option<String>) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(value) if is_valid_filter_date(&value) => Ok(Some(value)),
        Some(value) => Err(ValidationError::BadDateFormat {
            field: field.name(),
            value,
        }),
    }
}

/// Time constraint: either a relative window or calendar bounds, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalFilter {
    Recency(Recency),
    DateRange(DateRange),
}

/// Allow-list or deny-list of domains/URLs.
///
/// Entries are kept exactly as supplied, so deny entries keep their `-` prefix.
/// The only way to build one is [`DomainFilter::from_entries`], so a value
/// always holds 1 to [`MAX_DOMAIN_FILTERS`] entries of a single mode.
///
/// ```compile_fail
/// use perplexity_mcp::models::DomainFilter;
///
/// let mixed = DomainFilter {
///     entries: vec!["a.com".to_string(), "-b.com".to_string()],
///     exclusion: false,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    entries: Vec<String>,
    exclusion: bool,
}

impl DomainFilter {
    /// Classify a list of entries. Returns `Ok(None)` for an empty list.
    pub fn from_entries(entries: Vec<String>) -> Result<Option<Self>, ValidationError> {
        if entries.len() > MAX_DOMAIN_FILTERS {
            return Err(ValidationError::TooManyDomains {
                count: entries.len(),
            });
        }
        if entries.is_empty() {
            return Ok(None);
        }

        let excluded = entries.iter().filter(|e| e.starts_with('-')).count();
        if excluded != 0 && excluded != entries.len() {
            return Err(ValidationError::MixedDomainMode);
        }

        Ok(Some(DomainFilter {
            exclusion: excluded != 0,
            entries,
        }))
    }

    /// Entries in the original order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether this is a deny-list
    pub fn is_exclusion(&self) -> bool {
        self.exclusion
    }
}

/// Validated filter combination for one request.
///
/// Every part is checked when it is built, so any `FilterSet` can be sent as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    temporal: Option<TemporalFilter>,
    domains: Option<DomainFilter>,
}

impl FilterSet {
    /// Combine already validated parts
    pub fn new(temporal: Option<TemporalFilter>, domains: Option<DomainFilter>) -> Self {
        Self { temporal, domains }
    }

    /// No filters at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Only a recency window
    pub fn recency(recency: Recency) -> Self {
        Self::new(Some(TemporalFilter::Recency(recency)), None)
    }

    /// Only calendar bounds
    pub fn date_range(range: DateRange) -> Self {
        Self::new(Some(TemporalFilter::DateRange(range)), None)
    }

    /// Replace the domain filter
    pub fn with_domains(mut self, domains: DomainFilter) -> Self {
        self.domains = Some(domains);
        self
    }

    /// The time constraint, if any
    pub fn temporal(&self) -> Option<&TemporalFilter> {
        self.temporal.as_ref()
    }

    /// The domain filter, if any
    pub fn domains(&self) -> Option<&DomainFilter> {
        self.domains.as_ref()
    }

    /// Whether any filter is set
    pub fn is_empty(&self) -> bool {
        self.temporal.is_none() && self.domains.is_none()
    }
}

/// Filter arguments as received from a caller, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterArgs {
    #[serde(default, rename = "search_recency_filter")]
    pub recency: Option<Recency>,

    #[serde(default, rename = "search_after_date_filter")]
    pub search_after_date: Option<String>,

    #[serde(default, rename = "search_before_date_filter")]
    pub search_before_date: Option<String>,

    #[serde(default, rename = "last_updated_after_filter")]
    pub last_updated_after: Option<String>,

    #[serde(default, rename = "last_updated_before_filter")]
    pub last_updated_before: Option<String>,

    #[serde(default, rename = "search_domain_filter")]
    pub domain_filter: Option<Vec<String>>,
}

impl FilterArgs {
    /// Drop the categories not in `capabilities`
    pub fn restrict(mut self, capabilities: FilterCapabilities) -> Self {
        if !capabilities.contains(FilterCapabilities::RECENCY) {
            self.recency = None;
        }
        if !capabilities.contains(FilterCapabilities::DATE_RANGE) {
            self.search_after_date = None;
            self.search_before_date = None;
            self.last_updated_after = None;
            self.last_updated_before = None;
        }
        if !capabilities.contains(FilterCapabilities::DOMAIN) {
            self.domain_filter = None;
        }
        self
    }

    /// Whether any date field is present
    pub fn has_dates(&self) -> bool {
        self.search_after_date.is_some()
            || self.search_before_date.is_some()
            || self.last_updated_after.is_some()
            || self.last_updated_before.is_some()
    }
}
