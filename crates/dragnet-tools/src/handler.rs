//! The handler seam between the dispatcher and the tool pipelines.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dragnet_core::error::ProviderError;

/// Sentinel prefix marking a Markdown body as an error.
///
/// The flag travels out-of-band in [`HandlerOutput::failed`]; the sentinel
/// exists only in the rendered text, emitted at formatting time.
pub const ERROR_SENTINEL: &str = "# ❌";

/// What a tool invocation always produces.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    /// Markdown body returned to the caller.
    pub body: String,
    /// Structured record mirroring the body's counters.
    pub metadata: Value,
    /// Whether the invocation as a whole failed.
    pub failed: bool,
}

impl HandlerOutput {
    /// A successful output.
    #[must_use]
    pub fn success(body: impl Into<String>, metadata: Value) -> Self {
        Self {
            body: body.into(),
            metadata,
            failed: false,
        }
    }

    /// A failed output rendered from a classified error.
    ///
    /// The body leads with the error sentinel, names the error kind, and
    /// adds the temporary-error hint when a retry might succeed.
    #[must_use]
    pub fn failure(title: &str, error: &ProviderError) -> Self {
        Self::failure_with_hint(title, error, None)
    }

    /// A failed output with an extra remediation hint (e.g. the missing
    /// environment variable for credential failures).
    #[must_use]
    pub fn failure_with_hint(title: &str, error: &ProviderError, hint: Option<&str>) -> Self {
        let mut body = format!("{ERROR_SENTINEL} {title}\n\n**{}**: {}\n", error.kind, error.message);
        if error.retryable {
            body.push_str("\nThis error may be temporary.\n");
        }
        if let Some(hint) = hint {
            body.push('\n');
            body.push_str(hint);
            body.push('\n');
        }
        Self {
            body,
            metadata: serde_json::json!({
                "error_kind": error.kind,
                "retryable": error.retryable,
                "status": error.status,
            }),
            failed: true,
        }
    }
}

/// A dispatchable tool pipeline.
///
/// Implementations must be panic-free in intent and must never return an
/// error out-of-band; the dispatcher additionally contains any panic that
/// slips through.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool's registry name.
    fn name(&self) -> &'static str;

    /// Run the tool against already-validated arguments.
    ///
    /// `cancel` is the server's shutdown token; backoff sleeps race it so
    /// an in-flight invocation drains in bounded time.
    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput;
}

/// Bounds-check a batch size against a tool's limits.
///
/// The schema enforces the same bounds; handlers re-check for defensive
/// clarity and so the limits hold even for callers that bypass the
/// dispatcher.
pub(crate) fn check_batch_size(
    label: &str,
    len: usize,
    min: usize,
    max: usize,
) -> Result<(), HandlerOutput> {
    if !(min..=max).contains(&len) {
        let error = ProviderError::new(
            dragnet_core::error::ErrorKind::InvalidInput,
            format!("expected between {min} and {max} {label}, got {len}"),
        );
        return Err(HandlerOutput::failure("Invalid request", &error));
    }
    Ok(())
}

/// Parse tool arguments into a typed struct, shaping failures as output.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    args: Value,
) -> Result<T, HandlerOutput> {
    serde_json::from_value(args).map_err(|e| {
        let error = ProviderError::new(
            dragnet_core::error::ErrorKind::InvalidInput,
            format!("invalid arguments: {e}"),
        );
        HandlerOutput::failure("Invalid request", &error)
    })
}

/// Remediation hint for credential failures.
pub(crate) fn credential_hint(env_var: &str) -> String {
    format!("This looks like a missing environment variable: set `{env_var}` and restart.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragnet_core::error::ErrorKind;

    #[test]
    fn failure_body_carries_sentinel_and_kind() {
        let error = ProviderError::new(ErrorKind::RateLimited, "too many requests");
        let output = HandlerOutput::failure("Search failed", &error);
        assert!(output.failed);
        assert!(output.body.starts_with(ERROR_SENTINEL));
        assert!(output.body.contains("rate_limited"));
        assert!(output.body.contains("This error may be temporary."));
    }

    #[test]
    fn permanent_failure_omits_temporary_hint() {
        let error = ProviderError::new(ErrorKind::Auth, "bad key");
        let output = HandlerOutput::failure("Scrape failed", &error);
        assert!(!output.body.contains("temporary"));
    }

    #[test]
    fn hint_is_appended() {
        let error = ProviderError::new(ErrorKind::Auth, "bad key");
        let hint = credential_hint("SCRAPER_API_KEY");
        let output = HandlerOutput::failure_with_hint("Scrape failed", &error, Some(&hint));
        assert!(output.body.contains("missing environment variable"));
        assert!(output.body.contains("SCRAPER_API_KEY"));
    }

    #[test]
    fn batch_size_bounds() {
        assert!(check_batch_size("keywords", 5, 1, 20).is_ok());
        assert!(check_batch_size("keywords", 0, 1, 20).is_err());
        assert!(check_batch_size("keywords", 21, 1, 20).is_err());
        let err = check_batch_size("urls", 1, 2, 50).unwrap_err();
        assert!(err.failed);
        assert!(err.body.contains("between 2 and 50 urls"));
    }

    #[test]
    fn parse_args_shapes_errors() {
        #[derive(serde::Deserialize, Debug)]
        struct Args {
            #[allow(dead_code)]
            keywords: Vec<String>,
        }
        let err = parse_args::<Args>(serde_json::json!({"keywords": "not-an-array"})).unwrap_err();
        assert!(err.failed);
        assert!(err.body.contains("invalid arguments"));
    }
}
