//! # Perplexity MCP
//!
//! A Model Context Protocol (MCP) server exposing the Perplexity API as tools:
//! conversational answers, deep research, reasoning and ranked web search.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Conversations, filters, request bodies and validated responses
//! - [`engine`]: Completion and search engines, one upstream request per call
//! - [`mcp`]: MCP tool registry and server transports
//! - [`utils`]: Dispatcher, stream assembly and input validation
//! - [`config`]: Settings, environment overrides and config files

pub mod config;
pub mod engine;
pub mod mcp;
pub mod models;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigProvider, EnvConfigProvider, Settings};
pub use engine::{CompletionEngine, EngineError, Engines, SearchEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
