//! Error-message scrubbing before anything reaches the database or the UI.

use std::sync::LazyLock;

use regex::Regex;

/// Stored when a failure carried no message at all.
pub const UNKNOWN_ERROR: &str = "Erro desconhecido";

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9_-]{30,}\b").expect("token regex"));
static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("ipv4 regex")
});
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("url regex"));

/// Redact long token-like runs, IPv4 literals and URLs, then truncate to
/// `max_len` characters (plus a `...` marker).
pub fn sanitize_error_message(raw: &str, max_len: usize) -> String {
    if raw.trim().is_empty() {
        return UNKNOWN_ERROR.to_string();
    }

    let msg = TOKEN_RE.replace_all(raw, "[REDACTED]");
    let msg = IPV4_RE.replace_all(&msg, "[IP]");
    let msg = URL_RE.replace_all(&msg, "[URL]");

    if msg.chars().count() > max_len {
        let mut truncated: String = msg.chars().take(max_len).collect();
        truncated.push_str("...");
        truncated
    } else {
        msg.into_owned()
    }
}
