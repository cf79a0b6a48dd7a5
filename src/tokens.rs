//! Token accounting for the `usage` block.
//!
//! Counts use the cl100k_base encoding. If the encoder cannot be built the
//! count degrades to a chars/4 estimate instead of failing the request.

use once_cell::sync::OnceCell;
use tiktoken_rs::{cl100k_base, CoreBPE};

static CL100K: OnceCell<Option<CoreBPE>> = OnceCell::new();

fn encoder() -> Option<&'static CoreBPE> {
    CL100K
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                tracing::warn!(error = %err, "cl100k_base unavailable; estimating token counts");
                None
            }
        })
        .as_ref()
}

/// Number of tokens in `text`.
pub fn count_tokens(text: &str) -> u64 {
    match encoder() {
        Some(bpe) => bpe.encode_ordinary(text).len() as u64,
        None => (text.chars().count() as u64).div_ceil(4),
    }
}
