//! MCP (Model Context Protocol) implementation.

mod handlers;
pub mod server;
mod tools;

pub use handlers::{tool_error, tool_output, CompletionToolHandler, SearchToolHandler};
pub use server::McpServer;
pub use tools::{Tool, ToolHandler, ToolRegistry};
