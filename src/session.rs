//! Credential sessions: one short-lived Double access token per client credential.
//!
//! A session refreshes its token lazily, when a caller asks for it after the
//! TTL ran out. Refreshes are single-flight: callers queued behind an
//! in-flight refresh reuse its outcome instead of issuing their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, error, info};

use crate::client::DoubleClient;
use crate::util::mask_secret;

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    /// `None` until the first successful refresh.
    expires_at: Option<Instant>,
    /// When the most recent refresh attempt finished, successful or not.
    last_attempt: Option<Instant>,
}

impl TokenState {
    fn is_fresh(&self, now: Instant) -> bool {
        self.access_token.is_some() && self.expires_at.is_some_and(|at| now < at)
    }
}

/// Access token state for one credential.
#[derive(Debug)]
pub struct CredentialSession {
    credential: String,
    state: tokio::sync::Mutex<TokenState>,
}

impl CredentialSession {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            state: tokio::sync::Mutex::new(TokenState::default()),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Return a usable access token, refreshing first if it has expired.
    ///
    /// `None` means no refresh has ever succeeded; the chat call then goes out
    /// unauthenticated and fails upstream.
    pub async fn access_token(&self, client: &DoubleClient) -> Option<String> {
        let requested_at = Instant::now();
        let mut state = self.state.lock().await;
        if state.is_fresh(Instant::now()) {
            return state.access_token.clone();
        }
        // A refresh finished while we were queued on the lock; take its result.
        if state.last_attempt.is_some_and(|at| at >= requested_at) {
            debug!(
                credential = %mask_secret(&self.credential),
                "reusing concurrent refresh outcome"
            );
            return state.access_token.clone();
        }
        self.refresh(&mut state, client).await;
        state.access_token.clone()
    }

    async fn refresh(&self, state: &mut TokenState, client: &DoubleClient) {
        match client.refresh_access_token(&self.credential).await {
            Ok(token) => {
                state.access_token = Some(token);
                state.expires_at = Some(Instant::now() + client.config().token_ttl);
                info!(
                    credential = %mask_secret(&self.credential),
                    "Access token refreshed"
                );
            }
            Err(err) => {
                // The previous token (if any) is kept as-is.
                error!(
                    credential = %mask_secret(&self.credential),
                    error = %err,
                    "Error refreshing access token"
                );
            }
        }
        state.last_attempt = Some(Instant::now());
    }
}

struct Entry {
    session: Arc<CredentialSession>,
    last_used: u64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    tick: u64,
}

/// Process-wide credential -> session map, bounded with LRU eviction.
///
/// Evicting a session only forgets it; callers still holding the `Arc` keep
/// using it until they are done.
pub struct SessionRegistry {
    client: DoubleClient,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl SessionRegistry {
    pub fn new(client: DoubleClient, capacity: usize) -> Self {
        Self {
            client,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn client(&self) -> &DoubleClient {
        &self.client
    }

    /// Get or lazily create the session for `credential`.
    pub fn session(&self, credential: &str) -> Arc<CredentialSession> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.tick += 1;
        let tick = entries.tick;

        if let Some(entry) = entries.map.get_mut(credential) {
            entry.last_used = tick;
            return entry.session.clone();
        }

        if entries.map.len() >= self.capacity {
            let oldest = entries
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.map.remove(&key);
                debug!(credential = %mask_secret(&key), "evicted idle credential session");
            }
        }

        let session = Arc::new(CredentialSession::new(credential));
        entries.map.insert(
            credential.to_string(),
            Entry {
                session: session.clone(),
                last_used: tick,
            },
        );
        session
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .len()
    }

    pub fn contains(&self, credential: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .contains_key(credential)
    }
}
