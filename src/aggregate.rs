//! Whole-body (non-streaming) responses.
//!
//! The upstream returns one full answer per call, so `n` choices cost `n`
//! sequential calls, each with its own retry budget. Any choice that exhausts
//! its retries fails the whole response.

use crate::dispatch::RetryDispatcher;
use crate::error::ProxyError;
use crate::models::chat::{ChatChoice, ChatCompletionResponse, ChatResponseMessage, ChatUsage};
use crate::models::upstream::UpstreamRequest;
use crate::reframe::SYSTEM_FINGERPRINT;
use crate::session::CredentialSession;
use crate::tokens::count_tokens;
use crate::util::{new_chat_id, unix_now};

/// Upper bound on `n`; larger values are clamped.
pub const MAX_CHOICES: u32 = 16;

/// Assemble the client response from finished choices.
pub fn build_response(
    model: &str,
    contents: Vec<String>,
    prompt_tokens: u64,
) -> ChatCompletionResponse {
    let completion_tokens: u64 = contents.iter().map(|c| count_tokens(c)).sum();
    let choices = contents
        .into_iter()
        .enumerate()
        .map(|(index, content)| ChatChoice {
            index: index as u32,
            message: ChatResponseMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: "stop".to_string(),
        })
        .collect();

    ChatCompletionResponse {
        id: new_chat_id(),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices,
        usage: ChatUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
    }
}

/// Run `n` upstream calls and aggregate them into one response.
///
/// `n` is clamped to `1..=MAX_CHOICES`. `prompt_tokens` is computed once by
/// the caller from the request messages.
pub async fn aggregate(
    dispatcher: &RetryDispatcher,
    session: &CredentialSession,
    body: &UpstreamRequest,
    n: u32,
    prompt_tokens: u64,
) -> Result<ChatCompletionResponse, ProxyError> {
    let n = n.clamp(1, MAX_CHOICES);
    let mut contents = Vec::with_capacity(n as usize);
    for index in 0..n {
        let content = dispatcher.call_whole(session, body).await?;
        tracing::debug!(index, "choice completed");
        contents.push(content);
    }
    Ok(build_response(&body.chat_model, contents, prompt_tokens))
}
