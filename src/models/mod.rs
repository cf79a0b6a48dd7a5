//! Data models for the client-facing Chat Completions API and the Double upstream.
//!
//! This module groups two submodules:
//! - `chat`: the Chat Completions request plus the whole-body and streaming response shapes.
//! - `upstream`: the Double chat request body and the auth refresh reply.
//!
//! The mapping logic that converts `chat::ChatCompletionRequest` to
//! `upstream::UpstreamRequest` is implemented in `crate::conversion`.

pub mod chat;
pub mod upstream;

pub use chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatDelta,
    ChatMessage, ChatResponseMessage, ChatStreamChoice, ChatUsage, Role,
};
pub use upstream::{AuthRefreshResponse, UpstreamMessage, UpstreamRequest};
