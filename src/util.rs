use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use rand::{distributions::Alphanumeric, Rng};
use tracing_subscriber::{fmt, EnvFilter};

use crate::client::DoubleClient;
use crate::config::ProxyConfig;
use crate::dispatch::RetryDispatcher;
use crate::keys::KeyRotation;
use crate::session::SessionRegistry;

/// Initialize dotenv and structured tracing based on RUST_LOG.
///
/// - Supports explicit env file paths via ENV_FILE or DOTENV_PATH
/// - Falls back to default .env discovery
/// - Logs the source used
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    for key in ["ENV_FILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty()
                && std::path::Path::new(p).is_file()
                && dotenvy::from_filename(p).is_ok()
            {
                env_source = format!("{p} ({key})");
                break;
            }
        }
    }

    if env_source == "none" {
        if let Ok(path) = dotenvy::dotenv() {
            env_source = path.display().to_string();
        }
    }

    // Initialize tracing (respects RUST_LOG potentially provided by the env file)
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Read an environment variable the lenient way: `KEY`, then `key`, then
/// `KEY` upper-cased. Empty values count as unset.
pub fn env_value(key: &str) -> Option<String> {
    [key.to_string(), key.to_lowercase(), key.to_uppercase()]
        .iter()
        .find_map(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Truthy env flag: 1, true, yes, on.
pub fn env_flag(key: &str) -> bool {
    env_value(key)
        .map(|v| v.to_ascii_lowercase())
        .map(|v| v == "1" || v == "true" || v == "yes" || v == "on")
        .unwrap_or(false)
}

/// Build the outbound HTTP client shared by the auth and chat calls.
///
/// Per-call timeouts are applied by the callers; only the connect timeout and
/// proxy settings live on the client.
pub fn build_http_client(config: &ProxyConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);

    if config.no_proxy {
        builder = builder.no_proxy();
    } else if let Some(url) = config.proxy_url.as_deref() {
        match reqwest::Proxy::all(url) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => tracing::warn!(error = %e, proxy = url, "ignoring invalid proxy URL"),
        }
    }

    builder = builder.user_agent(format!("chat2double/{}", env!("CARGO_PKG_VERSION")));

    builder.build().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to build configured HTTP client; using defaults");
        reqwest::Client::new()
    })
}

/// Shared application state used by the HTTP server and handlers.
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub sessions: SessionRegistry,
    pub dispatcher: RetryDispatcher,
    /// Round-robin cursor for comma-separated credential lists.
    pub rotation: KeyRotation,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        let config = Arc::new(config);
        let client = DoubleClient::new(build_http_client(&config), config.clone());
        Self {
            sessions: SessionRegistry::new(client.clone(), config.session_capacity),
            dispatcher: RetryDispatcher::new(client),
            rotation: KeyRotation::default(),
            config,
        }
    }
}

/// Build a JSON error response with the given HTTP status and message.
pub fn error_response(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({ "error": { "message": msg } });
    (status, axum::Json(body)).into_response()
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// `chatcmpl-` followed by 29 random alphanumeric characters.
pub fn new_chat_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(29)
        .map(char::from)
        .collect();
    format!("chatcmpl-{suffix}")
}

/// First characters of a secret, for log lines.
pub fn mask_secret(secret: &str) -> String {
    let head: String = secret.chars().take(4).collect();
    format!("{head}…")
}

/// Permissive CORS layer: any origin, method and header.
///
/// Preflight `OPTIONS` requests are answered here and never reach a handler.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ids_have_prefix_and_29_alphanumerics() {
        let id = new_chat_id();
        let suffix = id.strip_prefix("chatcmpl-").expect("prefix");
        assert_eq!(suffix.len(), 29);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(new_chat_id(), id);
    }

    #[test]
    fn masked_secrets_keep_only_a_prefix() {
        assert_eq!(mask_secret("sk-abcdef"), "sk-a…");
        assert_eq!(mask_secret("ab"), "ab…");
    }
}
