#![allow(dead_code)]

pub mod upstream_stub;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat2double::config::ProxyConfig;
use chat2double::server::build_router;
use chat2double::util::AppState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use upstream_stub::{StubBehavior, UpstreamStub};

/// Proxy configuration pointed at `base_url`, with pacing disabled and short
/// timeouts so failing tests fail fast.
pub fn test_config(base_url: &str) -> ProxyConfig {
    ProxyConfig {
        upstream_base_url: base_url.to_string(),
        pacing_delay: Duration::ZERO,
        token_ttl: Duration::from_secs(60),
        connect_timeout: Duration::from_secs(2),
        stream_read_timeout: Duration::from_secs(5),
        whole_timeout: Duration::from_secs(5),
        ..ProxyConfig::default()
    }
}

/// A base URL nothing listens on.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

/// The proxy itself, served on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    join: JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn spawn(config: ProxyConfig) -> Self {
        let app = build_router(Arc::new(AppState::new(config)));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let server = axum::serve(listener, app.into_make_service());
        let join = tokio::spawn(async move {
            if let Err(e) = server.await {
                eprintln!("Test server error: {e:?}");
            }
        });

        TestServer {
            base_url: format!("http://{}", addr),
            addr,
            join,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("failed building reqwest client"),
        }
    }

    /// POST a JSON body to the chat endpoint.
    pub async fn post_chat(
        &self,
        body: &serde_json::Value,
        auth_bearer: Option<&str>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut rb = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(body);
        if let Some(b) = auth_bearer {
            rb = rb.bearer_auth(b);
        }
        rb.send().await
    }

    pub async fn post_chat_with_query_key(
        &self,
        body: &serde_json::Value,
        key: &str,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .query(&[("key", key)])
            .json(body)
            .send()
            .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

pub fn sample_chat_request() -> serde_json::Value {
    serde_json::json!({
        "model": "gpt-4-turbo",
        "messages": [
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "hi"}
        ]
    })
}

pub fn sample_streaming_chat_request() -> serde_json::Value {
    serde_json::json!({
        "model": "gpt-4-turbo",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    })
}

/// Split an SSE body into its `data:` payloads, `[DONE]` included.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .map(str::trim_end)
        .filter(|s| !s.is_empty())
        .map(|s| s.strip_prefix("data: ").unwrap_or(s).to_string())
        .collect()
}
