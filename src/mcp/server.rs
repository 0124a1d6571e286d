//! MCP server implementation using pmcp (Pragmatic AI's rust-mcp-sdk).
//!
//! This module provides the MCP server implementation using the pmcp crate
//! for JSON-RPC handling over stdio and streamable HTTP.
//!
//! pmcp serialises whatever a tool handler returns into a single text block.
//! The tool handlers here already build a complete `CallToolResult`
//! (`content`, `structuredContent`, `isError`), so both transports lift that
//! value back to the top level of the response before it is written out.

use crate::engine::Engines;
use crate::mcp::handlers::tool_error;
use crate::mcp::tools::ToolRegistry;
use async_trait::async_trait;
use pmcp::{
    server::http_middleware::{
        ServerHttpContext, ServerHttpMiddleware, ServerHttpMiddlewareChain, ServerHttpResponse,
    },
    server::streamable_http_server::{StreamableHttpServer, StreamableHttpServerConfig},
    shared::{StdioTransport, Transport, TransportMessage},
    types::jsonrpc::ResponsePayload,
    Error, RequestHandlerExtra, Server, ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Name advertised to MCP clients
pub const SERVER_NAME: &str = "perplexity-mcp";

/// The MCP server exposing the Perplexity tools over stdio or HTTP
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
}

impl McpServer {
    /// Create a new MCP server over the given engines
    pub fn new(engines: &Engines) -> Result<Self, pmcp::Error> {
        let tools = ToolRegistry::new(engines);
        let server = Self::build_server_impl(tools)?;
        Ok(Self {
            server: Arc::new(Mutex::new(server)),
        })
    }

    fn build_server_impl(tools: ToolRegistry) -> Result<Server, pmcp::Error> {
        let mut builder = Server::builder()
            .name(SERVER_NAME)
            .version(env!("CARGO_PKG_VERSION"))
            .capabilities(ServerCapabilities::default());

        for tool in tools.all() {
            let tool_handler = ToolWrapper {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                input_schema: tool.input_schema.clone(),
                handler: tool.handler.clone(),
            };
            builder = builder.tool(tool_handler.name.clone(), tool_handler);
        }

        builder.build()
    }

    /// Run the server in stdio mode until the client disconnects
    pub async fn run(self) -> Result<(), pmcp::Error> {
        tracing::info!("Starting MCP server in stdio mode");

        // run() takes ownership of the Server
        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("Cannot unwrap Arc - multiple references exist"))?
            .into_inner();

        server
            .run(ToolResultTransport::new(StdioTransport::new()))
            .await
    }

    /// Run the server over streamable HTTP in stateless mode.
    ///
    /// No session ids are issued and every response is plain JSON, so each
    /// POST is an independent tool call.
    pub async fn run_http(&self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::invalid_params(format!("Invalid address: {}", e)))?;

        let mut middleware = ServerHttpMiddlewareChain::new();
        middleware.add(Arc::new(ToolResultMiddleware));

        let config = StreamableHttpServerConfig {
            session_id_generator: None,
            enable_json_response: true,
            event_store: None,
            http_middleware: Some(Arc::new(middleware)),
            ..Default::default()
        };
        let http_server =
            StreamableHttpServer::with_config(socket_addr, self.server.clone(), config);

        let (bound, handle) = http_server.start().await?;
        tracing::info!("MCP server listening on http://{}", bound);
        Ok((bound, handle))
    }
}

/// Replace a pmcp-wrapped tool result with the result the handler built.
///
/// Only a single text block whose text decodes to an object with a `content`
/// list is unwrapped; every other result is left alone.
fn lift_tool_result(result: &mut Value) {
    let inner = match result.get("content").and_then(Value::as_array).map(Vec::as_slice) {
        Some([block]) if block.get("type").and_then(Value::as_str) == Some("text") => block
            .get("text")
            .and_then(Value::as_str)
            .and_then(|text| serde_json::from_str::<Value>(text).ok()),
        _ => None,
    };

    if let Some(inner) = inner.filter(|v| v.get("content").is_some_and(Value::is_array)) {
        *result = inner;
    }
}

/// Stdio transport that lifts tool results on the way out
#[derive(Debug)]
struct ToolResultTransport<T> {
    inner: T,
}

impl<T> ToolResultTransport<T> {
    fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Transport> Transport for ToolResultTransport<T> {
    async fn send(&mut self, mut message: TransportMessage) -> pmcp::Result<()> {
        if let TransportMessage::Response(response) = &mut message {
            if let ResponsePayload::Result(result) = &mut response.payload {
                lift_tool_result(result);
            }
        }
        self.inner.send(message).await
    }

    async fn receive(&mut self) -> pmcp::Result<TransportMessage> {
        self.inner.receive().await
    }

    async fn close(&mut self) -> pmcp::Result<()> {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn transport_type(&self) -> &'static str {
        self.inner.transport_type()
    }
}

/// HTTP middleware that lifts tool results in JSON responses
#[derive(Debug)]
struct ToolResultMiddleware;

#[async_trait]
impl ServerHttpMiddleware for ToolResultMiddleware {
    async fn on_response(
        &self,
        response: &mut ServerHttpResponse,
        _context: &ServerHttpContext,
    ) -> pmcp::Result<()> {
        let Ok(mut message) = serde_json::from_slice::<Value>(&response.body) else {
            return Ok(());
        };

        if let Some(result) = message.get_mut("result") {
            lift_tool_result(result);
            response.body = serde_json::to_vec(&message)?;
        }
        Ok(())
    }
}

/// Wrapper for adapting our Tool to pmcp's ToolHandler
#[derive(Clone)]
struct ToolWrapper {
    name: String,
    description: Option<String>,
    input_schema: Value,
    handler: Arc<dyn crate::mcp::tools::ToolHandler>,
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        tracing::debug!("Tool call: {}", self.name);
        match self.handler.execute(args).await {
            Ok(output) => Ok(output),
            Err(message) => Ok(tool_error(message)),
        }
    }

    fn metadata(&self) -> Option<ToolInfo> {
        Some(ToolInfo::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;

    #[test]
    fn test_server_builds_with_all_tools() {
        let engines = Engines::new(Arc::new(Settings::new("k", "http://127.0.0.1:9")));
        assert!(McpServer::new(&engines).is_ok());
    }

    #[test]
    fn test_lift_tool_result() {
        let built = json!({
            "content": [{"type": "text", "text": "Answer"}],
            "structuredContent": {"response": "Answer"},
            "isError": false
        });
        let mut wrapped = json!({
            "content": [{"type": "text", "text": built.to_string()}],
            "isError": false
        });

        lift_tool_result(&mut wrapped);
        assert_eq!(wrapped, built);
    }

    #[test]
    fn test_lift_leaves_other_results_alone() {
        let tools = json!({"tools": [{"name": "perplexity_ask"}]});
        let mut result = tools.clone();
        lift_tool_result(&mut result);
        assert_eq!(result, tools);

        let plain = json!({"content": [{"type": "text", "text": "{\"answer\": 1}"}]});
        let mut result = plain.clone();
        lift_tool_result(&mut result);
        assert_eq!(result, plain);
    }

    async fn call_tool(addr: SocketAddr, name: &str, arguments: Value) -> Value {
        reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": name, "arguments": arguments}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_tool_call_wire_shape() {
        let mut upstream = mockito::Server::new_async().await;
        let _mock = upstream
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"Answer"}}]}"#)
            .create_async()
            .await;

        let engines = Engines::new(Arc::new(Settings::new("k", upstream.url())));
        let server = McpServer::new(&engines).unwrap();
        let (addr, handle) = server.run_http("127.0.0.1:0").await.unwrap();

        let response = call_tool(
            addr,
            "perplexity_ask",
            json!({"messages": [{"role": "user", "content": "q"}]}),
        )
        .await;
        assert_eq!(
            response["result"],
            json!({
                "content": [{"type": "text", "text": "Answer"}],
                "structuredContent": {"response": "Answer"},
                "isError": false
            })
        );

        let response = call_tool(
            addr,
            "perplexity_reason",
            json!({
                "messages": [{"role": "user", "content": "q"}],
                "search_recency_filter": "day",
                "search_after_date_filter": "1/1/2025"
            }),
        )
        .await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("cannot be combined"));

        handle.abort();
    }
}
