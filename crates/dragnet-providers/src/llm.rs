//! Chat-completion extraction adapter (OpenRouter-style endpoint).
//!
//! The adapter sends a user-supplied extraction prompt plus page content
//! and returns the model's answer under a configured output-token budget.
//! Content above a character ceiling is truncated with a marker before
//! sending. An empty completion is a non-retryable internal failure. On
//! final failure the response is marked unprocessed and carries the
//! original input content, so callers can degrade to the raw page.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dragnet_core::error::{ErrorKind, ProviderError, ProviderResult};
use dragnet_core::retry::{RetryPolicy, run_with_retry};

use crate::http::{DEFAULT_TIMEOUT, USER_AGENT, bearer_header, classify_reqwest, truncate_content};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Character ceiling on content sent to the model.
const MAX_CONTENT_CHARS: usize = 48_000;

/// Marker appended when content was truncated.
const TRUNCATION_MARKER: &str = "\n\n[content truncated]";

/// One extraction request.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Content to extract from.
    pub content: String,
    /// Extraction instructions.
    pub prompt: String,
    /// Maximum output tokens for this call.
    pub max_tokens: u32,
}

/// Outcome of an extraction.
///
/// `processed == false` means the model never produced usable output; in
/// that case `content` is the original input so the caller can fall back
/// to it, and `error` says why.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResponse {
    /// Extracted content, or the original input when unprocessed.
    pub content: String,
    /// Whether the model produced this content.
    pub processed: bool,
    /// Model identifier used.
    pub model: String,
    /// Total tokens reported by the provider.
    pub tokens_used: Option<u32>,
    /// Set when the extraction ultimately failed.
    pub error: Option<ProviderError>,
}

/// Chat-completion extraction.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Extract content per the request, retrying transient failures under
    /// the adapter's provider-tuned policy. Never fails out-of-band; a
    /// final failure degrades to an unprocessed response.
    async fn extract(
        &self,
        request: ExtractionRequest,
        cancel: &CancellationToken,
    ) -> ExtractionResponse;
}

/// HTTP client for the chat-completion proxy.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_content_chars: usize,
    retry_policy: RetryPolicy,
}

impl LlmClient {
    /// Create a client for the default endpoint and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_content_chars: MAX_CONTENT_CHARS,
            retry_policy: RetryPolicy::api(),
        }
    }

    /// Override the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the content character ceiling.
    #[must_use]
    pub fn with_max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// One completion attempt. Retries are the caller's concern.
    async fn complete_once(&self, request: &ExtractionRequest) -> ProviderResult<Completion> {
        let content = truncate_content(&request.content, self.max_content_chars, TRUNCATION_MARKER);

        let body = CompletionRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.prompt,
                },
                Message {
                    role: "user",
                    content: &content,
                },
            ],
        };

        let auth = bearer_header(&self.api_key)?;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", auth)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("completion request failed: {text}"),
            ));
        }

        let decoded: CompletionResponse =
            response.json().await.map_err(|e| classify_reqwest(&e))?;

        let output = decoded
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();

        if output.trim().is_empty() {
            return Err(
                ProviderError::new(ErrorKind::Internal, "Empty response received")
                    .with_retryable(false),
            );
        }

        Ok(Completion {
            content: output.to_string(),
            tokens_used: decoded.usage.map(|u| u.total_tokens),
        })
    }
}

#[async_trait]
impl CompletionApi for LlmClient {
    async fn extract(
        &self,
        request: ExtractionRequest,
        cancel: &CancellationToken,
    ) -> ExtractionResponse {
        debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            content_chars = request.content.chars().count(),
            "running extraction"
        );

        let outcome =
            run_with_retry(|_| self.complete_once(&request), &self.retry_policy, cancel).await;

        match outcome.into_result() {
            Ok(completion) => ExtractionResponse {
                content: completion.content,
                processed: true,
                model: self.model.clone(),
                tokens_used: completion.tokens_used,
                error: None,
            },
            Err(error) => {
                warn!(kind = %error.kind, "extraction failed; returning original content");
                ExtractionResponse {
                    content: request.content,
                    processed: false,
                    model: self.model.clone(),
                    tokens_used: None,
                    error: Some(error),
                }
            },
        }
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_content_chars", &self.max_content_chars)
            .finish_non_exhaustive()
    }
}

struct Completion {
    content: String,
    tokens_used: Option<u32>,
}

// Wire types.

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let client = LlmClient::new("key")
            .with_model("custom/model")
            .with_base_url("http://localhost:9999/v1")
            .with_max_content_chars(100);
        assert_eq!(client.model, "custom/model");
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.max_content_chars, 100);
    }

    #[test]
    fn completion_response_parses_without_usage() {
        let decoded: CompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "answer"}}]}"#,
        )
        .unwrap();
        assert_eq!(decoded.choices[0].message.content.as_deref(), Some("answer"));
        assert!(decoded.usage.is_none());
    }

    #[test]
    fn completion_response_tolerates_null_content() {
        let decoded: CompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": null}}], "usage": {"total_tokens": 7}}"#,
        )
        .unwrap();
        assert!(decoded.choices[0].message.content.is_none());
        assert_eq!(decoded.usage.map(|u| u.total_tokens), Some(7));
    }

    #[tokio::test]
    async fn final_failure_degrades_to_original_content() {
        // Unroutable endpoint: every attempt fails with a network error,
        // and the adapter must hand back the original content unprocessed.
        let client = LlmClient::new("key")
            .with_base_url("http://127.0.0.1:1/v1")
            .with_timeout(Duration::from_millis(200))
            .with_retry_policy(RetryPolicy::no_retry());
        let cancel = CancellationToken::new();

        let response = client
            .extract(
                ExtractionRequest {
                    content: "the original page text".into(),
                    prompt: "summarize".into(),
                    max_tokens: 256,
                },
                &cancel,
            )
            .await;

        assert!(!response.processed);
        assert_eq!(response.content, "the original page text");
        assert!(response.error.is_some());
    }
}
