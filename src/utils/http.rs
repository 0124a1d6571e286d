//! Outbound HTTP dispatch with per-call proxy selection and deadline.

use reqwest::{header, Client, Response};
use serde::Serialize;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{ConfigError, ConfigProvider};

/// User agent sent with every request
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Header carrying the optional service origin
const SERVICE_HEADER: &str = "X-Service";

/// Network-level failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Network error: {cause}")]
    Network { cause: String },

    #[error("Timeout error: request did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream error: HTTP {status} {status_text}: {body}")]
    Upstream {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Network error: invalid proxy '{proxy}': {cause}")]
    InvalidProxy { proxy: String, cause: String },
}

impl DispatchError {
    /// Wrap a transport error, keeping its source chain in the message
    pub fn network(err: &reqwest::Error) -> Self {
        DispatchError::Network {
            cause: error_chain(err),
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Sends JSON POSTs to the configured API root.
///
/// Configuration is read from the provider on every call: proxy, timeout, key
/// and base URL changes apply to the next request without a restart.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<dyn ConfigProvider>,
}

impl Dispatcher {
    /// Create a dispatcher over a configuration provider
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    /// The configuration provider
    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    fn build_client(proxy: Option<&str>) -> Result<Client, DispatchError> {
        let builder = Client::builder().user_agent(USER_AGENT);
        let builder = match proxy {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url).map_err(|e| DispatchError::InvalidProxy {
                    proxy: url.to_string(),
                    cause: e.to_string(),
                })?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        builder.build().map_err(|e| DispatchError::network(&e))
    }

    /// POST `body` as JSON to `<base_url>/<path>` and hand the successful
    /// response to `handle`.
    ///
    /// The deadline covers connecting, the status line and everything `handle`
    /// does with the body. When it fires, the in-flight request and any body
    /// reads are dropped. Non-2xx statuses become [`DispatchError::Upstream`]
    /// with whatever body text could be read.
    pub async fn post_json<B, T, E, F, Fut>(&self, path: &str, body: &B, handle: F) -> Result<T, E>
    where
        B: Serialize + ?Sized,
        F: FnOnce(Response) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DispatchError> + From<ConfigError>,
    {
        let api_key = self.config.require_api_key()?;
        let timeout = self.config.timeout();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let proxy = self.config.proxy();
        let url = format!(
            "{}/{}",
            self.config.base_url().trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        tracing::debug!(
            "POST {} (timeout {}ms, {})",
            url,
            timeout_ms,
            if proxy.is_some() { "via proxy" } else { "direct" }
        );

        let client = Self::build_client(proxy.as_deref())?;
        let mut request = client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .json(body);
        if let Some(origin) = self.config.service_origin() {
            request = request.header(SERVICE_HEADER, origin);
        }

        let deadline = Instant::now() + timeout;
        let timed_out = || {
            tracing::warn!("Request to {} timed out after {}ms", url, timeout_ms);
            E::from(DispatchError::Timeout { timeout_ms })
        };

        let response = match tokio::time::timeout_at(deadline, request.send()).await {
            Ok(sent) => sent.map_err(|e| E::from(DispatchError::network(&e)))?,
            Err(_) => return Err(timed_out()),
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("{} returned HTTP {}", url, status.as_u16());
            return Err(E::from(DispatchError::Upstream {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: Self::error_body(response, deadline, &url).await,
            }));
        }

        match tokio::time::timeout_at(deadline, handle(response)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        }
    }

    /// Best-effort read of a non-2xx body within what is left of the deadline.
    ///
    /// A failed or stalled read yields an empty body so the status still
    /// surfaces.
    async fn error_body(response: Response, deadline: Instant, url: &str) -> String {
        match tokio::time::timeout_at(deadline, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::debug!("Could not read error body from {}: {}", url, e);
                String::new()
            }
            Err(_) => {
                tracing::debug!("Gave up reading error body from {} at the deadline", url);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::engine::EngineError;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn dispatcher(base_url: &str) -> Dispatcher {
        Dispatcher::new(Arc::new(Settings::new("test-key", base_url)))
    }

    async fn post_text(dispatcher: &Dispatcher) -> Result<String, EngineError> {
        dispatcher
            .post_json("search", &json!({}), |resp| async move {
                resp.text()
                    .await
                    .map_err(|e| EngineError::from(DispatchError::network(&e)))
            })
            .await
    }

    #[tokio::test]
    async fn test_post_json_sends_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .match_header("x-service", "unit-tests")
            .match_body(mockito::Matcher::Json(json!({"hello": "world"})))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let settings = Settings::new("test-key", server.url()).with_service_origin("unit-tests");
        let dispatcher = Dispatcher::new(Arc::new(settings));

        let text = dispatcher
            .post_json("/chat/completions", &json!({"hello": "world"}), |resp| async move {
                resp.text()
                    .await
                    .map_err(|e| EngineError::from(DispatchError::network(&e)))
            })
            .await
            .unwrap();

        assert_eq!(text, "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_upstream_error_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let result: Result<(), EngineError> = dispatcher(&server.url())
            .post_json("search", &json!({}), |_| async { Ok(()) })
            .await;

        match result {
            Err(EngineError::Dispatch(DispatchError::Upstream {
                status,
                status_text,
                body,
            })) => {
                assert_eq!(status, 429);
                assert_eq!(status_text, "Too Many Requests");
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_json_missing_key() {
        let settings = Settings {
            api_key: None,
            ..Settings::default()
        };
        let result: Result<(), EngineError> = Dispatcher::new(Arc::new(settings))
            .post_json("search", &json!({}), |_| async { Ok(()) })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Config(msg)) if msg.contains("PERPLEXITY_API_KEY")
        ));
    }

    #[tokio::test]
    async fn test_post_json_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result: Result<(), EngineError> = dispatcher(&format!("http://{}", addr))
            .post_json("search", &json!({}), |_| async { Ok(()) })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Dispatch(DispatchError::Network { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_proxy() {
        let settings = Settings::new("k", "http://127.0.0.1:9").with_proxy("::not a proxy::");
        let result: Result<(), EngineError> = Dispatcher::new(Arc::new(settings))
            .post_json("search", &json!({}), |_| async { Ok(()) })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Dispatch(DispatchError::InvalidProxy { .. }))
        ));
    }

    /// Reads one request (head plus `Content-Length` body) off the socket
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_stalled_error_body_keeps_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 100\r\n\r\npartial")
                .await
                .unwrap();
            // Hold the connection open without sending the rest of the body.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let settings = Settings::new("k", format!("http://{}", addr)).timeout_ms(300);
        let result: Result<(), EngineError> = Dispatcher::new(Arc::new(settings))
            .post_json("search", &json!({}), |_| async { Ok(()) })
            .await;

        assert_eq!(
            result,
            Err(EngineError::Dispatch(DispatchError::Upstream {
                status: 503,
                status_text: "Service Unavailable".to_string(),
                body: String::new(),
            }))
        );
    }

    #[tokio::test]
    async fn test_post_json_routes_through_proxy() {
        let mut proxy = mockito::Server::new_async().await;
        let mock = proxy
            .mock("POST", "/search")
            .match_header("host", "api.perplexity.invalid")
            .match_header("authorization", "Bearer k")
            .with_status(200)
            .with_body("proxied")
            .create_async()
            .await;

        let settings = Settings::new("k", "http://api.perplexity.invalid").with_proxy(proxy.url());
        let text = post_text(&Dispatcher::new(Arc::new(settings)))
            .await
            .unwrap();

        assert_eq!(text, "proxied");
        mock.assert_async().await;
    }

    /// Provider whose proxy can be switched between calls
    #[derive(Debug)]
    struct SwitchableProxy {
        base_url: String,
        proxy: Mutex<Option<String>>,
    }

    impl ConfigProvider for SwitchableProxy {
        fn api_key(&self) -> Option<String> {
            Some("k".to_string())
        }

        fn base_url(&self) -> String {
            self.base_url.clone()
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        fn proxy(&self) -> Option<String> {
            self.proxy.lock().unwrap().clone()
        }

        fn service_origin(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_proxy_is_read_on_every_call() {
        let mut upstream = mockito::Server::new_async().await;
        let direct = upstream
            .mock("POST", "/search")
            .with_status(200)
            .with_body("direct")
            .expect(1)
            .create_async()
            .await;

        let mut proxy = mockito::Server::new_async().await;
        let proxied = proxy
            .mock("POST", "/search")
            .match_header("host", upstream.host_with_port().as_str())
            .with_status(200)
            .with_body("proxied")
            .expect(1)
            .create_async()
            .await;

        let config = Arc::new(SwitchableProxy {
            base_url: upstream.url(),
            proxy: Mutex::new(None),
        });
        let dispatcher = Dispatcher::new(config.clone());

        assert_eq!(post_text(&dispatcher).await.unwrap(), "direct");
        *config.proxy.lock().unwrap() = Some(proxy.url());
        assert_eq!(post_text(&dispatcher).await.unwrap(), "proxied");

        direct.assert_async().await;
        proxied.assert_async().await;
    }

    #[test]
    fn test_error_messages() {
        let err = DispatchError::Timeout { timeout_ms: 1500 };
        assert!(err.to_string().contains("1500ms"));

        let err = DispatchError::Upstream {
            status: 500,
            status_text: "Internal Server Error".into(),
            body: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream error: HTTP 500 Internal Server Error: boom"
        );
    }
}
