use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

use crate::aggregate::aggregate;
use crate::conversion::{prompt_text, to_upstream_request, MODEL_LABELS};
use crate::error::ProxyError;
use crate::keys::resolve_credential;
use crate::models::chat::ChatCompletionRequest;
use crate::models::upstream::UpstreamRequest;
use crate::reframe::StreamReframer;
use crate::session::CredentialSession;
use crate::tokens::count_tokens;
use crate::util::{cors_layer, mask_secret, AppState};

/// Query parameters accepted by the chat endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    /// Credential fallback for clients that cannot set `Authorization`.
    pub key: Option<String>,
}

/// Build the Axum router with `/status` and `/v1/chat/completions`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Service status endpoint: version, routes and the models the upstream knows.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let models: Vec<&str> = MODEL_LABELS.iter().map(|(name, _)| *name).collect();
    Json(serde_json::json!({
        "name": "chat2double",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": ["/status", "/v1/chat/completions"],
        "models": models,
        "upstream": state.config.upstream_base_url,
    }))
}

/// Chat Completions entry point.
/// - Streaming: SSE re-framed from the upstream text stream
/// - Non-streaming: `n` whole-body calls aggregated into one JSON response
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("chat", request_id = %uuid::Uuid::new_v4());
    forward(state, query, headers, body)
        .instrument(span)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

async fn forward(
    state: Arc<AppState>,
    query: KeyQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let credential = resolve_credential(&headers, query.key.as_deref(), &state.rotation)?;
    let req: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| ProxyError::InvalidBody(e.to_string()))?;

    let upstream = to_upstream_request(&req);
    let session = state.sessions.session(&credential);
    info!(
        credential = %mask_secret(&credential),
        model = %req.model,
        chat_model = %upstream.chat_model,
        messages = req.messages.len(),
        stream = req.is_stream(),
        "forwarding chat request"
    );

    if req.is_stream() {
        return Ok(stream_response(&state, session, upstream));
    }

    let prompt_tokens = count_tokens(&prompt_text(&req));
    let response = aggregate(
        &state.dispatcher,
        &session,
        &upstream,
        req.n.unwrap_or(1),
        prompt_tokens,
    )
    .await?;
    Ok(Json(response).into_response())
}

fn stream_response(
    state: &AppState,
    session: Arc<CredentialSession>,
    upstream: UpstreamRequest,
) -> Response {
    let reframer = StreamReframer::new(upstream.chat_model.clone(), state.config.pacing_delay);
    let events = state.dispatcher.call_stream(session, Arc::new(upstream));
    let body = Body::from_stream(reframer.reframe(events));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
