use crate::models::chat;
use crate::models::upstream as up;

/// Label used for any client model name the upstream does not know.
pub const DEFAULT_MODEL_LABEL: &str = "GPT4 Turbo";

/// Client model name -> Double model label.
pub const MODEL_LABELS: &[(&str, &str)] = &[
    ("gpt-4-turbo", "GPT4 Turbo"),
    ("claude-3-opus-20240229", "Claude 3 (Opus)"),
    ("llama-3-70B", "Llama 3 70B"),
    ("gpt-4-turbo-2024-04-09", "GPT4 Turbo (2024-04-09)"),
];

/// Resolve the upstream label for a client model name, falling back to
/// [`DEFAULT_MODEL_LABEL`].
pub fn map_model(model: &str) -> &'static str {
    MODEL_LABELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_MODEL_LABEL)
}

fn map_role(role: &chat::Role) -> String {
    match role {
        chat::Role::System => "user".to_string(),
        other => other.as_str().to_string(),
    }
}

/// Convert a Chat Completions request into the Double chat request.
///
/// Mapping highlights:
/// - messages: forwarded in order; `system` collapses into `user`, content is
///   flattened to text, and each message gets an empty `codeContexts` list.
/// - model: mapped through [`MODEL_LABELS`]; unknown names get [`DEFAULT_MODEL_LABEL`].
/// - nothing else passes through (`n` and `stream` are handled by the proxy itself).
pub fn to_upstream_request(src: &chat::ChatCompletionRequest) -> up::UpstreamRequest {
    let messages = src
        .messages
        .iter()
        .map(|m| up::UpstreamMessage {
            role: map_role(&m.role),
            message: m.text(),
            code_contexts: Vec::new(),
        })
        .collect();

    up::UpstreamRequest {
        api_key: "null".to_string(),
        messages,
        chat_model: map_model(&src.model).to_string(),
    }
}

/// Concatenation of every message's text, used for prompt token accounting.
pub fn prompt_text(src: &chat::ChatCompletionRequest) -> String {
    src.messages.iter().map(|m| m.text()).collect()
}
