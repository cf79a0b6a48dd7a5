//! Retry policy for upstream chat calls.
//!
//! Both paths get the same fixed budget of [`MAX_ATTEMPTS`] calls with no
//! delay between them. Connection failures, read timeouts and non-2xx
//! statuses are retried; see [`is_retryable`] for which transport errors
//! count. A 200 reply is final, whatever its body says.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::client::{CallMode, DoubleClient};
use crate::decode::{decode, LineBuffer};
use crate::error::{AttemptFailure, ProxyError};
use crate::models::upstream::UpstreamRequest;
use crate::session::CredentialSession;

/// Total upstream calls per choice or stream, first call included.
pub const MAX_ATTEMPTS: u32 = 3;

/// What the streaming path observes from the upstream, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Attempt `attempt` got response headers back (any status).
    Opened { attempt: u32 },
    /// One decoded line of a 200 body, terminator stripped.
    Line(String),
    /// The 200 body ended cleanly.
    Completed,
    /// Every attempt failed.
    Exhausted { attempts: u32 },
    /// The call failed in a way retrying cannot fix.
    Aborted(String),
}

/// Whether a chat call error is worth another attempt: connection failures,
/// timeouts and errors while sending or reading. Builder and redirect errors
/// would fail the same way again.
pub fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() || err.is_decode()
}

#[derive(Clone)]
pub struct RetryDispatcher {
    client: DoubleClient,
    max_attempts: u32,
}

impl RetryDispatcher {
    pub fn new(client: DoubleClient) -> Self {
        Self {
            client,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    async fn attempt_whole(
        &self,
        session: &CredentialSession,
        body: &UpstreamRequest,
    ) -> Result<String, AttemptFailure> {
        let token = session.access_token(&self.client).await;
        let resp = self
            .client
            .post_chat(body, token.as_deref(), CallMode::Whole)
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let text = decode(&bytes);
        if !status.is_success() {
            return Err(AttemptFailure::status(status, &text));
        }
        Ok(text)
    }

    /// Whole-body chat call: the decoded body of the first 200 reply.
    pub async fn call_whole(
        &self,
        session: &CredentialSession,
        body: &UpstreamRequest,
    ) -> Result<String, ProxyError> {
        for attempt in 1..=self.max_attempts {
            match self.attempt_whole(session, body).await {
                Ok(text) => {
                    debug!(attempt, len = text.len(), "upstream chat call succeeded");
                    return Ok(text);
                }
                Err(AttemptFailure::Transport(e)) if !is_retryable(&e) => {
                    error!(attempt, error = %e, "upstream chat call failed permanently");
                    return Err(ProxyError::Http(e));
                }
                Err(failure) => warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    error = %failure,
                    "upstream chat attempt failed"
                ),
            }
        }
        error!(
            attempts = self.max_attempts,
            "upstream chat call failed after multiple retries"
        );
        Err(ProxyError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Streaming chat call.
    ///
    /// Each attempt that reaches the upstream emits `Opened`; a 200 attempt
    /// then emits its lines and `Completed`. A failed attempt (including one
    /// that breaks mid-body) is followed by the next attempt, and the stream
    /// ends with `Exhausted` once the budget is spent, or with `Aborted` on
    /// an error retrying cannot fix. The wait for response headers and each
    /// body read are bounded by the stream read timeout. Dropping the stream
    /// drops the in-flight upstream response with it.
    pub fn call_stream(
        &self,
        session: Arc<CredentialSession>,
        body: Arc<UpstreamRequest>,
    ) -> impl Stream<Item = UpstreamEvent> + Send + 'static {
        let this = self.clone();
        async_stream::stream! {
            let read_timeout = this.client.config().stream_read_timeout;

            for attempt in 1..=this.max_attempts {
                let token = session.access_token(&this.client).await;
                let sent = tokio::time::timeout(
                    read_timeout,
                    this.client.post_chat(&body, token.as_deref(), CallMode::Stream),
                )
                .await;
                let resp = match sent {
                    Ok(Ok(resp)) => resp,
                    Ok(Err(e)) if !is_retryable(&e) => {
                        error!(attempt, error = %e, "upstream stream call failed permanently");
                        yield UpstreamEvent::Aborted(e.to_string());
                        return;
                    }
                    Ok(Err(e)) => {
                        warn!(attempt, error = %AttemptFailure::from(e), "upstream stream attempt failed");
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            attempt,
                            error = %AttemptFailure::ReadTimeout(read_timeout),
                            "upstream stream attempt got no response headers"
                        );
                        continue;
                    }
                };

                yield UpstreamEvent::Opened { attempt };

                let status = resp.status();
                if !status.is_success() {
                    let text = match tokio::time::timeout(read_timeout, resp.bytes()).await {
                        Ok(Ok(b)) => decode(&b),
                        _ => String::new(),
                    };
                    warn!(
                        attempt,
                        error = %AttemptFailure::status(status, &text),
                        "upstream stream attempt rejected"
                    );
                    continue;
                }

                let mut bytes = resp.bytes_stream();
                let mut lines = LineBuffer::new();
                let mut failure = None;
                loop {
                    match tokio::time::timeout(read_timeout, bytes.next()).await {
                        Ok(Some(Ok(chunk))) => {
                            for line in lines.push(&chunk) {
                                yield UpstreamEvent::Line(line);
                            }
                        }
                        Ok(Some(Err(e))) => {
                            failure = Some(AttemptFailure::Transport(e));
                            break;
                        }
                        Ok(None) => break,
                        Err(_) => {
                            failure = Some(AttemptFailure::ReadTimeout(read_timeout));
                            break;
                        }
                    }
                }
                if let Some(failure) = failure {
                    warn!(attempt, error = %failure, "upstream stream broke off");
                    continue;
                }

                if let Some(rest) = lines.finish() {
                    yield UpstreamEvent::Line(rest);
                }
                yield UpstreamEvent::Completed;
                return;
            }

            error!(attempts = this.max_attempts, "upstream stream failed after multiple retries");
            yield UpstreamEvent::Exhausted { attempts: this.max_attempts };
        }
    }
}
