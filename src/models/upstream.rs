use serde::{Deserialize, Serialize};

/// One message in the Double chat request.
///
/// The upstream only knows "user" and "assistant"; system prompts are
/// collapsed into user turns before they get here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub message: String,
    /// Editor code attachments; always sent empty.
    #[serde(rename = "codeContexts", default)]
    pub code_contexts: Vec<serde_json::Value>,
}

/// Request body for `POST /api/v1/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// The upstream expects the literal string "null" here; the real
    /// credential travels as the bearer token.
    pub api_key: String,
    pub messages: Vec<UpstreamMessage>,
    pub chat_model: String,
}

/// Reply of `POST /api/auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthRefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}
