//! Provider-error taxonomy and classification.
//!
//! Every failure that crosses an adapter, retry, or handler boundary is a
//! [`ProviderError`]: a closed [`ErrorKind`] tag plus a human message, an
//! optional HTTP status, an optional cause, and a retryability flag.
//! Classification is total — any input shape maps to a defined kind — and
//! never panics.

use serde::Serialize;
use thiserror::Error;

/// Maximum length of a message preserved from an unclassified failure.
const MAX_MESSAGE_LEN: usize = 500;

/// Result alias for operations that fail with a [`ProviderError`].
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider signalled a rate limit (HTTP 429).
    RateLimited,
    /// Request deadline or provider timeout.
    Timeout,
    /// Connection-level failure (refused, reset, DNS).
    Network,
    /// Provider temporarily unavailable (HTTP 502/503/510, other 5xx).
    ServiceUnavailable,
    /// Authentication failure (HTTP 401, bad API key).
    Auth,
    /// Request was malformed (HTTP 400).
    InvalidInput,
    /// Resource does not exist (HTTP 404).
    NotFound,
    /// Account quota or permission exhausted (HTTP 403).
    QuotaExceeded,
    /// Response body could not be decoded.
    Parse,
    /// Provider-side internal error (HTTP 500).
    Internal,
    /// Anything that fits no other category.
    Unknown,
}

impl ErrorKind {
    /// Default retryability for this kind.
    ///
    /// Rate limits, timeouts, connection failures, unavailability, and
    /// provider-internal errors are worth retrying; everything else is a
    /// permanent condition.
    #[must_use]
    pub const fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Timeout
                | Self::Network
                | Self::ServiceUnavailable
                | Self::Internal
        )
    }

    /// Stable lowercase label, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Auth => "auth",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Parse => "parse",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from an outbound provider call.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Underlying cause, when one was available.
    pub cause: Option<String>,
    /// Whether a retry might succeed.
    pub retryable: bool,
}

impl ProviderError {
    /// Create an error with the kind's default retryability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            cause: None,
            retryable: kind.default_retryable(),
        }
    }

    /// Attach an HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a cause string.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Override the retryability flag.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Classify an HTTP status code per the provider dispatch table.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => ErrorKind::InvalidInput,
            401 => ErrorKind::Auth,
            403 => ErrorKind::QuotaExceeded,
            404 => ErrorKind::NotFound,
            408 | 504 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::Internal,
            502 | 503 | 510 => ErrorKind::ServiceUnavailable,
            s if s >= 500 => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Unknown,
        };
        Self::new(kind, message).with_status(status)
    }

    /// Classify a cancellation or abort signal.
    ///
    /// Aborted calls look like timeouts to callers: the work did not
    /// complete, but retrying may succeed.
    #[must_use]
    pub fn cancelled(context: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("{context} was cancelled"))
    }

    /// Classify an arbitrary failure message.
    ///
    /// This is the fallback path for failures that carry neither a status
    /// code nor a structured cause. Matching is a prioritized scan of the
    /// message text; anything unmatched becomes [`ErrorKind::Unknown`] with
    /// the message truncated to a safe length.
    #[must_use]
    pub fn classify_message(message: &str) -> Self {
        if message.is_empty() {
            return Self::new(ErrorKind::Unknown, "unknown error (empty message)");
        }

        let lower = message.to_lowercase();

        if lower.contains("econnrefused")
            || lower.contains("enotfound")
            || lower.contains("econnreset")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
        {
            return Self::new(ErrorKind::Network, truncate(message));
        }

        if lower.contains("econnaborted")
            || lower.contains("etimedout")
            || lower.contains("timeout")
            || lower.contains("timed out")
        {
            return Self::new(ErrorKind::Timeout, truncate(message));
        }

        if lower.contains("api_key") || lower.contains("api key") || lower.contains("invalid api") {
            return Self::new(ErrorKind::Auth, truncate(message));
        }

        if lower.contains("json") || lower.contains("parse") || lower.contains("unexpected token") {
            return Self::new(ErrorKind::Parse, truncate(message));
        }

        Self::new(ErrorKind::Unknown, truncate(message))
    }

    /// Classify the payload of a caught panic.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload.downcast_ref::<&str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .map_or("task panicked", String::as_str)
            },
            |s| *s,
        );
        Self::new(ErrorKind::Internal, format!("task panicked: {message}"))
            .with_retryable(false)
    }

    /// Returns true when the failure is an authentication or quota problem
    /// that a configuration change (not a retry) would fix.
    #[must_use]
    pub const fn is_credential_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Auth | ErrorKind::QuotaExceeded)
    }
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dispatch_table() {
        let cases: &[(u16, ErrorKind, bool)] = &[
            (400, ErrorKind::InvalidInput, false),
            (401, ErrorKind::Auth, false),
            (403, ErrorKind::QuotaExceeded, false),
            (404, ErrorKind::NotFound, false),
            (408, ErrorKind::Timeout, true),
            (429, ErrorKind::RateLimited, true),
            (500, ErrorKind::Internal, true),
            (502, ErrorKind::ServiceUnavailable, true),
            (503, ErrorKind::ServiceUnavailable, true),
            (504, ErrorKind::Timeout, true),
            (510, ErrorKind::ServiceUnavailable, true),
            (521, ErrorKind::ServiceUnavailable, true),
            (418, ErrorKind::Unknown, false),
        ];
        for &(status, kind, retryable) in cases {
            let err = ProviderError::from_status(status, "x");
            assert_eq!(err.kind, kind, "status {status}");
            assert_eq!(err.retryable, retryable, "status {status}");
            assert_eq!(err.status, Some(status));
        }
    }

    #[test]
    fn message_heuristics() {
        assert_eq!(
            ProviderError::classify_message("connect ECONNREFUSED 1.2.3.4:443").kind,
            ErrorKind::Network
        );
        assert_eq!(
            ProviderError::classify_message("request timed out after 30s").kind,
            ErrorKind::Timeout
        );
        assert_eq!(
            ProviderError::classify_message("Invalid API key provided").kind,
            ErrorKind::Auth
        );
        assert_eq!(
            ProviderError::classify_message("Unexpected token < in JSON at position 0").kind,
            ErrorKind::Parse
        );
        assert_eq!(
            ProviderError::classify_message("something else entirely").kind,
            ErrorKind::Unknown
        );
    }

    #[test]
    fn network_beats_timeout_in_priority() {
        // ECONNRESET mentions neither timeout keyword, but a message with
        // both must classify by the earlier rule.
        let err = ProviderError::classify_message("ECONNRESET while waiting for timeout");
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn empty_message_is_unknown_and_permanent() {
        let err = ProviderError::classify_message("");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(2000);
        let err = ProviderError::classify_message(&long);
        assert!(err.message.len() < 600);
        assert!(err.message.ends_with('…'));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(600);
        let err = ProviderError::classify_message(&long);
        // Must not panic, and must remain valid UTF-8 (guaranteed by String).
        assert!(err.message.chars().count() <= 501);
    }

    #[test]
    fn cancellation_is_retryable_timeout() {
        let err = ProviderError::cancelled("scrape");
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
    }

    #[test]
    fn panic_payload_classification() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = ProviderError::from_panic(payload.as_ref());
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(!err.retryable);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn retryable_override_survives_builder() {
        let err = ProviderError::new(ErrorKind::Internal, "empty response").with_retryable(false);
        assert!(!err.retryable);
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = ProviderError::new(ErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "rate_limited: slow down");
    }
}
