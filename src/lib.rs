#![forbid(unsafe_code)]
#![doc = r#"
Chat2Double

Accept OpenAI Chat Completions requests and proxy them to the Double chat API,
re-framing Double's plain-text replies as Chat Completions responses.

Crate highlights
- Library: pure conversion via `to_upstream_request(&ChatCompletionRequest)`.
- HTTP server (in `server`): `POST /v1/chat/completions` (streaming and whole-body) and `/status`.
- Per-credential access tokens with lazy, single-flight refresh (`session`).
- Fixed-budget retries for every upstream call (`dispatch`).
- SSE re-framing with 3-character fragments and configurable pacing (`reframe`).

Modules
- `models`: Data structures for Chat Completions and the Double upstream.
- `conversion`: Mapping logic from Chat -> Double.
- `decode`: Lenient byte -> text decoding and line splitting.
- `session`: Credential sessions and the bounded session registry.
- `dispatch`: Retry policy for upstream chat calls.
- `reframe`: Streaming chunk re-framing.
- `aggregate`: Non-streaming responses and usage accounting.
- `server`: Axum router/handlers (the binary uses this).
- `util`: Shared helpers (tracing, env, HTTP client, app state).
"#]

pub mod aggregate;
pub mod client;
pub mod config;
pub mod conversion;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod models;
pub mod reframe;
pub mod server;
pub mod session;
pub mod tokens;
pub mod util;

// Re-export the primary conversion function for ergonomic library use.
pub use crate::conversion::to_upstream_request;

pub use crate::config::ProxyConfig;
pub use crate::error::ProxyError;

// Re-export model namespaces for convenience (downstream users can do `use chat2double::chat`).
pub use crate::models::{chat, upstream};
