//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Topics, narration and generated prompts can be long, and storage URLs
//! may carry signatures. These functions keep span fields short and free
//! of credentials.

use std::path::Path;

/// Maximum number of characters kept by [`truncate`] for span fields.
pub const MAX_FIELD_CHARS: usize = 80;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Shortens free text to at most `max_chars` characters, appending `…`
/// when something was cut. Splits on char boundaries.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Shortens free text to [`MAX_FIELD_CHARS`].
pub fn short(text: &str) -> String {
    truncate(text, MAX_FIELD_CHARS)
}

/// Strips the query string and userinfo from a URL.
///
/// - `https://bucket.s3.amazonaws.com/a.mp4?X-Amz-Signature=abc` → `https://bucket.s3.amazonaws.com/a.mp4?****`
/// - `https://user:pw@host/a.png` → `https://****@host/a.png`
/// - `/local/path.png` → unchanged
pub fn redact_url(url: &str) -> String {
    let mut out = url.to_string();

    if let Some(scheme_end) = out.find("://") {
        let authority_start = scheme_end + 3;
        let authority_end = out[authority_start..]
            .find('/')
            .map(|i| authority_start + i)
            .unwrap_or(out.len());
        if let Some(at_pos) = out[authority_start..authority_end].rfind('@') {
            out = format!(
                "{}****{}",
                &out[..authority_start],
                &out[authority_start + at_pos..]
            );
        }
    }

    if let Some(q) = out.find('?') {
        out.truncate(q);
        out.push_str("?****");
    }

    out
}
