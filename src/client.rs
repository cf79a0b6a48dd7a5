use std::sync::Arc;

use http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::models::upstream::{AuthRefreshResponse, UpstreamRequest};

/// API version pinned by every chat call.
pub const DOUBLE_VERSION: &str = "2024-03-04";

/// Whether a chat call is read as a live stream or as one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Stream,
    Whole,
}

/// Thin wrapper over `reqwest` for the two Double endpoints.
#[derive(Clone)]
pub struct DoubleClient {
    http: reqwest::Client,
    config: Arc<ProxyConfig>,
}

impl DoubleClient {
    pub fn new(http: reqwest::Client, config: Arc<ProxyConfig>) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Exchange a credential for a fresh access token.
    ///
    /// A 2xx reply without an `access_token` field counts as a failure.
    pub async fn refresh_access_token(&self, credential: &str) -> Result<String, ProxyError> {
        let resp = self
            .http
            .post(self.config.auth_url())
            .bearer_auth(credential)
            .timeout(self.config.connect_timeout)
            .send()
            .await?
            .error_for_status()?;

        let body: AuthRefreshResponse = resp.json().await?;
        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProxyError::AuthRefresh("access token not found in response".into()))
    }

    /// Send one chat request. The status is not checked here.
    ///
    /// Streaming calls carry no overall timeout; the reader enforces a
    /// per-read timeout instead. Whole-body calls get a very long one.
    pub async fn post_chat(
        &self,
        body: &UpstreamRequest,
        access_token: Option<&str>,
        mode: CallMode,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut rb = self
            .http
            .post(self.config.chat_url())
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "gzip, deflate, br")
            .header(ACCEPT_LANGUAGE, "zh-CN")
            .header("Double-Version", DOUBLE_VERSION)
            .json(body);
        if let Some(token) = access_token {
            rb = rb.bearer_auth(token);
        }
        if mode == CallMode::Whole {
            rb = rb.timeout(self.config.whole_timeout);
        }
        rb.send().await
    }
}
