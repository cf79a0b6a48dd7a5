use std::time::Duration;

use crate::util::{env_flag, env_value};

/// Runtime settings for the proxy core.
///
/// `Default` holds the built-in values; [`ProxyConfig::from_env`] overlays
/// whatever the environment provides. Tests build the struct directly.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Scheme + host of the Double API, without a trailing slash.
    pub upstream_base_url: String,
    /// How long a refreshed access token is trusted before the next refresh.
    pub token_ttl: Duration,
    /// Delay between two streamed fragments.
    pub pacing_delay: Duration,
    pub connect_timeout: Duration,
    /// Longest silence tolerated between two upstream stream reads.
    pub stream_read_timeout: Duration,
    /// Overall timeout for a whole-body chat call.
    pub whole_timeout: Duration,
    /// Maximum number of credential sessions kept alive.
    pub session_capacity: usize,
    /// Outbound proxy applied to both auth and chat calls.
    pub proxy_url: Option<String>,
    /// Ignore any proxy configuration, including the system one.
    pub no_proxy: bool,
    pub port: u16,
}

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.double.bot";
pub const DEFAULT_PORT: u16 = 3030;

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            token_ttl: Duration::from_secs(10),
            pacing_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(10),
            stream_read_timeout: Duration::from_secs(250),
            whole_timeout: Duration::from_secs(999),
            session_capacity: 1024,
            proxy_url: None,
            no_proxy: false,
            port: DEFAULT_PORT,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

impl ProxyConfig {
    /// Build the configuration from environment variables.
    ///
    /// Environment:
    /// - CHAT2DOUBLE_UPSTREAM_BASE_URL           -> upstream scheme + host
    /// - CHAT2DOUBLE_TOKEN_TTL_SECONDS           -> access token lifetime (u64)
    /// - CHAT2DOUBLE_PACING_MS                   -> delay between stream fragments (u64)
    /// - CHAT2DOUBLE_CONNECT_TIMEOUT_SECONDS     -> connect timeout (u64)
    /// - CHAT2DOUBLE_STREAM_READ_TIMEOUT_SECONDS -> per-read stream timeout (u64)
    /// - CHAT2DOUBLE_WHOLE_TIMEOUT_SECONDS       -> whole-body call timeout (u64)
    /// - CHAT2DOUBLE_SESSION_CAPACITY            -> credential sessions kept (usize)
    /// - CHAT2DOUBLE_NO_PROXY = 1|true|yes|on    -> disable all proxies
    /// - HTTP_PROXY / HTTPS_PROXY (any case)     -> outbound proxy
    /// - SERVER_PORT                             -> listen port
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(url) = env_value("CHAT2DOUBLE_UPSTREAM_BASE_URL") {
            cfg.upstream_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env_parse::<u64>("CHAT2DOUBLE_TOKEN_TTL_SECONDS") {
            cfg.token_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("CHAT2DOUBLE_PACING_MS") {
            cfg.pacing_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("CHAT2DOUBLE_CONNECT_TIMEOUT_SECONDS") {
            cfg.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CHAT2DOUBLE_STREAM_READ_TIMEOUT_SECONDS") {
            cfg.stream_read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CHAT2DOUBLE_WHOLE_TIMEOUT_SECONDS") {
            cfg.whole_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("CHAT2DOUBLE_SESSION_CAPACITY") {
            cfg.session_capacity = n.max(1);
        }
        cfg.no_proxy = env_flag("CHAT2DOUBLE_NO_PROXY");
        cfg.proxy_url = env_value("HTTP_PROXY").or_else(|| env_value("HTTPS_PROXY"));
        if let Some(port) = env_parse::<u16>("SERVER_PORT") {
            cfg.port = port;
        }

        cfg
    }

    pub fn auth_url(&self) -> String {
        format!("{}/api/auth/refresh", self.upstream_base_url)
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/v1/chat", self.upstream_base_url)
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
