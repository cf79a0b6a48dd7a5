use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Scripted behavior of the fake Double API.
#[derive(Clone)]
pub struct StubBehavior {
    /// Status of every auth refresh call.
    pub auth_status: StatusCode,
    /// Delay before the auth endpoint answers.
    pub auth_delay: Duration,
    /// Status of the n-th chat call; calls past the end get 200.
    pub chat_statuses: Vec<StatusCode>,
    /// Body pieces of a 200 chat reply, sent as separate stream frames.
    pub chat_pieces: Vec<String>,
    /// Delay before the chat endpoint sends response headers.
    pub chat_header_delay: Duration,
    /// Send the first body piece of a 200 reply, then never finish the body.
    pub stall_after_first_piece: bool,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            auth_status: StatusCode::OK,
            auth_delay: Duration::ZERO,
            chat_statuses: Vec::new(),
            chat_pieces: vec!["hello".to_string()],
            chat_header_delay: Duration::ZERO,
            stall_after_first_piece: false,
        }
    }
}

impl StubBehavior {
    pub fn failing_chat(times: usize, status: StatusCode) -> Self {
        Self {
            chat_statuses: vec![status; times],
            ..Self::default()
        }
    }

    /// Every chat call holds its response headers back for `delay`.
    pub fn stalled_headers(delay: Duration) -> Self {
        Self {
            chat_header_delay: delay,
            ..Self::default()
        }
    }

    /// Every chat call answers 200 with `first`, then hangs.
    pub fn stalled_body(first: &str) -> Self {
        Self {
            stall_after_first_piece: true,
            ..Self::default()
        }
        .with_body(&[first])
    }

    pub fn with_body(mut self, pieces: &[&str]) -> Self {
        self.chat_pieces = pieces.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Clone)]
struct StubState {
    behavior: StubBehavior,
    auth_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    auth_bearers: Arc<Mutex<Vec<String>>>,
    chat_bearers: Arc<Mutex<Vec<Option<String>>>>,
    chat_requests: Arc<Mutex<Vec<serde_json::Value>>>,
    chat_versions: Arc<Mutex<Vec<Option<String>>>>,
}

/// Fake Double API bound to an ephemeral local port.
#[derive(Clone)]
pub struct UpstreamStub {
    base_url: String,
    state: StubState,
    shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl UpstreamStub {
    pub async fn start(behavior: StubBehavior) -> Self {
        let state = StubState {
            behavior,
            auth_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            auth_bearers: Arc::new(Mutex::new(Vec::new())),
            chat_bearers: Arc::new(Mutex::new(Vec::new())),
            chat_requests: Arc::new(Mutex::new(Vec::new())),
            chat_versions: Arc::new(Mutex::new(Vec::new())),
        };

        let router = Router::new()
            .route("/api/auth/refresh", post(auth_handler))
            .route("/api/v1/chat", post(chat_handler))
            .with_state(Arc::new(state.clone()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub upstream");
        let addr = listener.local_addr().expect("stub upstream local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let server = axum::serve(listener, router.into_make_service());
        tokio::spawn(async move {
            tokio::select! {
                res = server => {
                    if let Err(err) = res {
                        eprintln!("Stub upstream server error: {err:?}");
                    }
                }
                _ = rx => {}
            }
        });

        UpstreamStub {
            base_url: format!("http://{}", addr),
            state,
            shutdown: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn url(&self) -> String {
        self.base_url.clone()
    }

    pub fn auth_calls(&self) -> usize {
        self.state.auth_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.state.chat_calls.load(Ordering::SeqCst)
    }

    pub fn auth_bearers(&self) -> Vec<String> {
        self.state.auth_bearers.lock().expect("lock").clone()
    }

    pub fn chat_bearers(&self) -> Vec<Option<String>> {
        self.state.chat_bearers.lock().expect("lock").clone()
    }

    pub fn chat_requests(&self) -> Vec<serde_json::Value> {
        self.state.chat_requests.lock().expect("lock").clone()
    }

    pub fn chat_versions(&self) -> Vec<Option<String>> {
        self.state.chat_versions.lock().expect("lock").clone()
    }
}

impl Drop for UpstreamStub {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }
}

fn header_string(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn auth_handler(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    let n = state.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(bearer) = header_string(&headers, header::AUTHORIZATION) {
        state.auth_bearers.lock().expect("lock").push(bearer);
    }
    if !state.behavior.auth_delay.is_zero() {
        tokio::time::sleep(state.behavior.auth_delay).await;
    }
    if !state.behavior.auth_status.is_success() {
        return (state.behavior.auth_status, "refresh rejected").into_response();
    }
    Json(serde_json::json!({ "access_token": format!("tok-{n}") })).into_response()
}

async fn chat_handler(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let n = state.chat_calls.fetch_add(1, Ordering::SeqCst);
    let bearer = header_string(&headers, header::AUTHORIZATION);
    state.chat_bearers.lock().expect("lock").push(bearer.clone());
    state
        .chat_versions
        .lock()
        .expect("lock")
        .push(header_string(&headers, "Double-Version"));
    state.chat_requests.lock().expect("lock").push(body);

    if !state.behavior.chat_header_delay.is_zero() {
        tokio::time::sleep(state.behavior.chat_header_delay).await;
    }

    if !bearer.is_some_and(|b| b.starts_with("Bearer tok-")) {
        return (StatusCode::UNAUTHORIZED, "invalid access token").into_response();
    }

    let status = state
        .behavior
        .chat_statuses
        .get(n)
        .copied()
        .unwrap_or(StatusCode::OK);
    if !status.is_success() {
        return (status, "upstream overloaded").into_response();
    }

    let pieces = state.behavior.chat_pieces.clone();
    let stream = futures_util::stream::iter(pieces.into_iter().map(Ok::<_, Infallible>));
    let body = if state.behavior.stall_after_first_piece {
        Body::from_stream(stream.take(1).chain(futures_util::stream::pending()))
    } else {
        Body::from_stream(stream)
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
