//! Client credential extraction.
//!
//! Callers pass `Authorization: Bearer <key>[,<key>...]` (or `?key=` when they
//! cannot set headers). A comma list is rotated round-robin, one key per
//! request.

use std::sync::atomic::{AtomicUsize, Ordering};

use http::HeaderMap;

use crate::error::ProxyError;

/// Split a comma-separated key list, dropping blanks.
pub fn split_keys(raw: &str) -> Result<Vec<&str>, ProxyError> {
    let keys: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(ProxyError::InvalidCredential);
    }
    Ok(keys)
}

/// Parse an `Authorization` value: exactly `<scheme> <keys>` with a
/// case-insensitive `bearer` scheme.
pub fn bearer_keys(header: &str) -> Result<Vec<&str>, ProxyError> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            split_keys(token)
        }
        _ => Err(ProxyError::InvalidCredential),
    }
}

/// Pick the key at `cursor`, wrapping around.
pub fn select_key<'a>(keys: &[&'a str], cursor: usize) -> Option<&'a str> {
    if keys.is_empty() {
        return None;
    }
    Some(keys[cursor % keys.len()])
}

/// Round-robin cursor shared by requests; the key list itself always comes
/// from the caller.
#[derive(Debug, Default)]
pub struct KeyRotation {
    cursor: AtomicUsize,
}

impl KeyRotation {
    /// Advance the cursor, then pick: a fresh rotation starts on the second key.
    pub fn next<'a>(&self, keys: &[&'a str]) -> Option<&'a str> {
        if keys.len() == 1 {
            return Some(keys[0]);
        }
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        select_key(keys, cursor)
    }
}

/// Resolve the credential for one request: the `Authorization` header wins,
/// the `key` query parameter is the fallback.
pub fn resolve_credential(
    headers: &HeaderMap,
    query_key: Option<&str>,
    rotation: &KeyRotation,
) -> Result<String, ProxyError> {
    let keys = match headers.get(http::header::AUTHORIZATION) {
        Some(value) => {
            let value = value.to_str().map_err(|_| ProxyError::InvalidCredential)?;
            bearer_keys(value)?
        }
        None => split_keys(query_key.ok_or(ProxyError::InvalidCredential)?)?,
    };
    rotation
        .next(&keys)
        .map(str::to_string)
        .ok_or(ProxyError::InvalidCredential)
}
