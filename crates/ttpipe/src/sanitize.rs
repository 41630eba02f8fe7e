//! Helpers for sanitizing data before it enters logs, span attributes or
//! client-facing error hints.

use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::LazyLock;

/// Longest hint text forwarded to clients.
pub const MAX_HINT_LEN: usize = 160;

static API_KEY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(sk-[A-Za-z0-9_\-]{8,}|AIza[0-9A-Za-z_\-]{20,}|(?i:bearer)\s+[A-Za-z0-9._\-]{8,})").ok()
});

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short deterministic hash of an identifier, for correlating log lines
/// without writing the identifier itself (session ids are bearer-like).
pub fn hash_id(id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Masks anything that looks like an API key or bearer token.
pub fn scrub_secrets(text: &str) -> String {
    match API_KEY_PATTERN.as_ref() {
        Some(re) => re.replace_all(text, "****").into_owned(),
        None => text.to_string(),
    }
}

/// Truncates on a char boundary, appending an ellipsis when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Scrubs then truncates a message so it can travel to a client as a hint.
pub fn client_safe(text: &str) -> String {
    truncate(&scrub_secrets(text), MAX_HINT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(&PathBuf::from("/home/user/uploads/timetable.png")),
            "timetable.png"
        );
    }

    #[test]
    fn test_redact_path_root() {
        assert_eq!(redact_path(&PathBuf::from("/")), "<unknown>");
    }

    #[test]
    fn test_hash_id_is_deterministic() {
        assert_eq!(hash_id("session-1"), hash_id("session-1"));
        assert_ne!(hash_id("session-1"), hash_id("session-2"));
        assert_eq!(hash_id("session-1").len(), 16);
    }

    #[test]
    fn test_scrub_secrets_masks_keys() {
        let scrubbed = scrub_secrets("auth failed for sk-ant-api03-abcdefghijkl");
        assert_eq!(scrubbed, "auth failed for ****");

        let scrubbed = scrub_secrets("header was Bearer abc.def.ghi123");
        assert!(!scrubbed.contains("abc.def"));
    }

    #[test]
    fn test_scrub_secrets_leaves_plain_text() {
        assert_eq!(scrub_secrets("rate limited (429)"), "rate limited (429)");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ümlaut", 3), "üml…");
        assert_eq!(truncate("short", 10), "short");
    }
}
