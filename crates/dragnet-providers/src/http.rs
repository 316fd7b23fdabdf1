//! Shared HTTP plumbing for the provider adapters.

use std::time::Duration;

use dragnet_core::error::{ErrorKind, ProviderError};

/// Default per-call deadline for outbound provider requests.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent on every outbound request.
pub(crate) const USER_AGENT: &str = concat!("dragnet/", env!("CARGO_PKG_VERSION"));

/// Classify a transport-level `reqwest` failure.
///
/// Deadline expiry maps to `Timeout`, connection-level failures (refused,
/// reset, DNS) to `Network`, body/decode failures to `Parse`; anything else
/// falls through to the message heuristics.
pub(crate) fn classify_reqwest(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::new(ErrorKind::Timeout, "request deadline exceeded")
            .with_cause(err.to_string());
    }
    if err.is_connect() {
        return ProviderError::new(ErrorKind::Network, "connection failed")
            .with_cause(err.to_string());
    }
    if err.is_decode() || err.is_body() {
        return ProviderError::new(ErrorKind::Parse, "response body unreadable")
            .with_cause(err.to_string());
    }
    ProviderError::classify_message(&err.to_string())
}

/// Build a `Bearer` auth header value, marked sensitive so it never shows
/// up in logs.
pub(crate) fn bearer_header(api_key: &str) -> Result<reqwest::header::HeaderValue, ProviderError> {
    let mut value = reqwest::header::HeaderValue::try_from(format!("Bearer {api_key}"))
        .map_err(|e| {
            ProviderError::new(
                ErrorKind::Auth,
                format!("API key contains invalid header characters: {e}"),
            )
        })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Truncate `content` to at most `max_chars` characters, appending a marker
/// when anything was dropped.
pub(crate) fn truncate_content(content: &str, max_chars: usize, marker: &str) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    format!("{truncated}{marker}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let value = bearer_header("sk-test").unwrap();
        assert!(value.is_sensitive());
    }

    #[test]
    fn bearer_header_rejects_control_chars() {
        let err = bearer_header("bad\nkey").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
    }

    #[test]
    fn truncate_content_short_input_untouched() {
        assert_eq!(truncate_content("hello", 10, "[cut]"), "hello");
    }

    #[test]
    fn truncate_content_appends_marker() {
        let out = truncate_content("abcdefgh", 4, "[cut]");
        assert_eq!(out, "abcd[cut]");
    }

    #[test]
    fn truncate_content_counts_chars_not_bytes() {
        let out = truncate_content("ééééé", 3, "…");
        assert_eq!(out, "ééé…");
    }
}
