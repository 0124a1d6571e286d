//! Utility modules supporting the engines.
//!
//! - [`Dispatcher`]: JSON POSTs with per-call proxy selection and a deadline
//! - [`DispatchError`]: Network, timeout and upstream status failures
//! - [`assemble`]: Fold a streamed completion into one response
//! - [`StreamAssembler`]: Incremental SSE line splitter behind [`assemble`]
//! - [`validate_filters`]: Turn raw filter arguments into a checked filter set
//! - [`ValidationError`]: Bad input caught before any request is sent
//!
//! # Streaming
//!
//! ```rust
//! use perplexity_mcp::utils::StreamAssembler;
//!
//! let mut assembler = StreamAssembler::new();
//! assembler.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n");
//! assembler.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\ndata: [DONE]\n");
//!
//! let response = assembler.finish().unwrap();
//! assert_eq!(response.content(), Some("Hello"));
//! ```
//!
//! # Filters
//!
//! ```rust
//! use perplexity_mcp::models::FilterArgs;
//! use perplexity_mcp::utils::{validate_filters, ValidationError};
//!
//! let args = FilterArgs {
//!     recency: None,
//!     search_after_date: Some("2025-03-01".to_string()),
//!     ..FilterArgs::default()
//! };
//! assert!(matches!(
//!     validate_filters(args),
//!     Err(ValidationError::BadDateFormat { .. })
//! ));
//! ```

mod http;
mod streaming;
mod validate;

pub use http::{DispatchError, Dispatcher};
pub use streaming::{assemble, StreamAccumulator, StreamAssembler};
pub use validate::{
    check_range, is_valid_filter_date, validate_country, validate_filters, validate_messages,
    ValidationError,
};
