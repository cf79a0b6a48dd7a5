//! Upstream bytes -> text.
//!
//! The Double API does not always label its charset, so bodies are decoded by
//! trying a short list of encodings strictly and, failing that, by letting
//! `chardetng` guess and decoding lossily. Decoding never fails.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, BIG5, GBK, UTF_8};

/// Encodings tried in order, without replacement.
pub const FALLBACK_CHAIN: &[&Encoding] = &[UTF_8, GBK, BIG5];

/// Decode a raw chunk to text.
///
/// Returns the first strict decoding in [`FALLBACK_CHAIN`] that succeeds;
/// otherwise decodes with the detected encoding, substituting U+FFFD for
/// malformed sequences.
pub fn decode(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    for encoding in FALLBACK_CHAIN {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guessed = detector.guess(None, true);
    let (text, had_errors) = guessed.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(
            encoding = guessed.name(),
            len = bytes.len(),
            "upstream bytes decoded with replacement characters"
        );
    }
    text.into_owned()
}

/// Splits a byte stream into decoded lines.
///
/// Bytes are buffered until a `\n` arrives so multi-byte characters split
/// across network chunks are decoded whole. Line terminators (`\n`, `\r\n`)
/// are stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(decode(&line));
        }
        lines
    }

    /// Flush the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.pending);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(decode(&rest))
    }
}
