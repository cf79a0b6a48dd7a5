//! Re-framing upstream text as Chat Completions SSE chunks.
//!
//! The Double API streams plain text lines. Clients expect
//! `chat.completion.chunk` events, so every line is cut into fixed-width
//! fragments and each fragment becomes one `data: {...}\n\n` event, paced by
//! a small sleep to mimic token-by-token delivery.
//!
//! Per stream attempt the event sequence is:
//! 1. a role-opening chunk (`delta: {role: "assistant", content: ""}`),
//! 2. one content chunk per fragment,
//! 3. a finish chunk (`delta: {}`, `finish_reason: "stop"`) and `data: [DONE]\n`.
//!
//! Every attempt gets a fresh chat id.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::dispatch::UpstreamEvent;
use crate::error::RETRIES_EXHAUSTED_MESSAGE;
use crate::models::chat::{ChatCompletionChunk, ChatDelta, ChatStreamChoice};
use crate::util::{new_chat_id, unix_now};

/// Width of one streamed fragment, in characters.
pub const FRAGMENT_CHARS: usize = 3;
pub const SYSTEM_FINGERPRINT: &str = "fp_a24b4d720c";
pub const DONE_LINE: &str = "data: [DONE]\n";

const CODE_FENCE: &str = "```";

/// Restore the line terminator; lines holding a code fence get an extra
/// leading newline so the fence still starts a line once fragments are
/// glued back together by the client.
pub fn prepare_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 2);
    if line.contains(CODE_FENCE) {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}

/// Cut `text` into consecutive [`FRAGMENT_CHARS`]-character pieces; the last
/// one may be shorter.
pub fn fragments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(FRAGMENT_CHARS)
        .map(|c| c.iter().collect())
        .collect()
}

/// Fragments for one upstream line.
pub fn line_fragments(line: &str) -> Vec<String> {
    fragments(&prepare_line(line))
}

/// Builds the chunks of one stream attempt.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    id: String,
    model: String,
}

impl ChunkBuilder {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn chunk(&self, delta: ChatDelta, finish_reason: &str) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now(),
            model: self.model.clone(),
            system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
            choices: vec![ChatStreamChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.to_string(),
            }],
        }
    }

    pub fn role_chunk(&self) -> ChatCompletionChunk {
        self.chunk(
            ChatDelta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
            },
            "null",
        )
    }

    pub fn content_chunk(&self, fragment: impl Into<String>) -> ChatCompletionChunk {
        self.chunk(
            ChatDelta {
                role: None,
                content: Some(fragment.into()),
            },
            "null",
        )
    }

    pub fn finish_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChatDelta::default(), "stop")
    }
}

/// Encode one chunk as an SSE event.
pub fn sse_event(chunk: &ChatCompletionChunk) -> Bytes {
    let json = serde_json::to_string(chunk).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize stream chunk");
        "{}".to_string()
    });
    Bytes::from(format!("data: {json}\n\n"))
}

/// Terminal event sent when the upstream call was given up.
pub fn error_event(message: &str) -> Bytes {
    let body = serde_json::json!({
        "error": { "message": message, "type": "upstream_error" }
    });
    Bytes::from(format!("data: {body}\n\n"))
}

fn frame(bytes: Bytes) -> Result<Bytes, Infallible> {
    Ok(bytes)
}

/// Turns [`UpstreamEvent`]s into the client's SSE byte stream.
#[derive(Debug, Clone)]
pub struct StreamReframer {
    model: String,
    pacing: Duration,
}

impl StreamReframer {
    pub fn new(model: impl Into<String>, pacing: Duration) -> Self {
        Self {
            model: model.into(),
            pacing,
        }
    }

    /// Lazy, single-pass re-framing of `events`.
    ///
    /// If the upstream gives up, an explicit error event is sent before
    /// `[DONE]` so clients can tell failure from an empty answer.
    pub fn reframe<S>(self, events: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
    where
        S: Stream<Item = UpstreamEvent> + Send + 'static,
    {
        let Self { model, pacing } = self;
        async_stream::stream! {
            futures_util::pin_mut!(events);
            let mut chunks: Option<ChunkBuilder> = None;

            while let Some(event) = events.next().await {
                match event {
                    UpstreamEvent::Opened { attempt } => {
                        let builder = ChunkBuilder::new(new_chat_id(), model.clone());
                        tracing::debug!(attempt, id = %builder.id(), "stream attempt opened");
                        yield frame(sse_event(&builder.role_chunk()));
                        chunks = Some(builder);
                    }
                    UpstreamEvent::Line(line) => {
                        if let Some(builder) = chunks.as_ref() {
                            for fragment in line_fragments(&line) {
                                yield frame(sse_event(&builder.content_chunk(fragment)));
                                if !pacing.is_zero() {
                                    tokio::time::sleep(pacing).await;
                                }
                            }
                        }
                    }
                    UpstreamEvent::Completed => {
                        if let Some(builder) = chunks.as_ref() {
                            yield frame(sse_event(&builder.finish_chunk()));
                        }
                        yield frame(Bytes::from_static(DONE_LINE.as_bytes()));
                        return;
                    }
                    UpstreamEvent::Exhausted { attempts } => {
                        tracing::warn!(attempts, "closing client stream with an error event");
                        yield frame(error_event(RETRIES_EXHAUSTED_MESSAGE));
                        yield frame(Bytes::from_static(DONE_LINE.as_bytes()));
                        return;
                    }
                    UpstreamEvent::Aborted(message) => {
                        tracing::warn!(error = %message, "closing client stream with an error event");
                        yield frame(error_event(&message));
                        yield frame(Bytes::from_static(DONE_LINE.as_bytes()));
                        return;
                    }
                }
            }
        }
    }
}
