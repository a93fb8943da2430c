//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Signature payloads, stage passwords and full document names never belong
//! in a span; these functions produce stand-ins that still let two log lines
//! be correlated.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const SHORT_ID_LEN: usize = 8;

/// First characters of a store id, enough to correlate log lines.
pub fn short_id(id: &str) -> String {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => format!("{}…", &id[..end]),
        None => id.to_string(),
    }
}

/// Describes a data URL by media type and payload size only.
///
/// - `data:image/png;base64,iVBOR...` → `image/png, 1234 chars`
/// - anything else → `<not a data url>, N chars`
pub fn summarize_data_url(data_url: &str) -> String {
    let trimmed = data_url.trim_start();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        return format!("<not a data url>, {} chars", data_url.len());
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header.split(';').next().unwrap_or("");
            let mime = if mime.is_empty() { "<no type>" } else { mime };
            format!("{}, {} chars", mime, payload.len())
        }
        None => format!("<no payload>, {} chars", data_url.len()),
    }
}

/// Returns a short deterministic hash of a document name for correlation
/// without exposing company names in traces.
pub fn hash_name(name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
