use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

/// Body text returned once the retry budget is spent.
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Request failed after multiple retries";

/// Errors the proxy core can surface to a caller.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing or malformed credential")]
    InvalidCredential,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("{}", RETRIES_EXHAUSTED_MESSAGE)]
    RetriesExhausted { attempts: u32 },

    #[error("access token refresh failed: {0}")]
    AuthRefresh(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidCredential | ProxyError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::AuthRefresh(_) | ProxyError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::RetriesExhausted { .. } => {
                let body = serde_json::json!({ "error": RETRIES_EXHAUSTED_MESSAGE });
                (self.status(), axum::Json(body)).into_response()
            }
            other => crate::util::error_response(other.status(), &other.to_string()),
        }
    }
}

/// Why a single upstream chat attempt did not produce a usable answer.
///
/// Every variant is retryable; the dispatcher decides when to stop.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no upstream bytes within {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl AttemptFailure {
    /// Build a status failure, keeping only a short excerpt of the body for logs.
    pub fn status(status: StatusCode, body: &str) -> Self {
        const MAX_EXCERPT: usize = 512;
        let body = match body.char_indices().nth(MAX_EXCERPT) {
            Some((cut, _)) => format!("{}…", &body[..cut]),
            None => body.to_string(),
        };
        AttemptFailure::Status { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_request() {
        assert_eq!(ProxyError::InvalidCredential.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::InvalidBody("eof".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn exhausted_retries_display_the_terminal_message() {
        let err = ProxyError::RetriesExhausted { attempts: 3 };
        assert_eq!(err.to_string(), RETRIES_EXHAUSTED_MESSAGE);
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn status_failure_truncates_long_bodies() {
        let long = "x".repeat(2000);
        match AttemptFailure::status(StatusCode::BAD_GATEWAY, &long) {
            AttemptFailure::Status { body, .. } => assert_eq!(body.chars().count(), 513),
            other => panic!("unexpected {other:?}"),
        }
    }
}
