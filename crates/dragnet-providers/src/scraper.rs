//! Scraping-proxy adapter with a three-mode fallback ladder.
//!
//! Modes escalate from plain fetch to JS rendering to JS rendering with a
//! geo code. The ladder advances on non-permanent failure, returns
//! immediately on 2xx or 404 (a valid "not found" terminal), and stops on a
//! permanent failure (400/401/403) without trying the remaining modes.
//! The batched operation runs the ladder per URL through the bounded
//! executor in windows, with a short pause between windows to reduce
//! burstiness.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use dragnet_core::error::ProviderError;
use dragnet_core::fanout::FanoutExecutor;

use crate::http::{DEFAULT_TIMEOUT, USER_AGENT, classify_reqwest};

const DEFAULT_BASE_URL: &str = "https://api.scraperapi.com";

/// Concurrency cap for batched scraping.
const BATCH_CAP: usize = 30;

/// Pause between consecutive batch windows.
const BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Default geo code for the geo-rendered mode.
const DEFAULT_COUNTRY_CODE: &str = "us";

/// Escalation ladder for a single URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Plain fetch, no rendering.
    Basic,
    /// JS-rendered fetch.
    Javascript,
    /// JS-rendered fetch pinned to a geo code.
    JavascriptGeo,
}

impl ScrapeMode {
    /// The ladder, in escalation order.
    pub const LADDER: [Self; 3] = [Self::Basic, Self::Javascript, Self::JavascriptGeo];

    /// Credits the provider charges for this mode.
    #[must_use]
    pub const fn credit_cost(self) -> u32 {
        match self {
            Self::Basic => 1,
            Self::Javascript => 10,
            Self::JavascriptGeo => 25,
        }
    }
}

/// Outcome of scraping one URL.
///
/// Failure is explicit in `error`; an empty `content` with no error is a
/// legal successful result (e.g. a 404 terminal).
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResponse {
    /// The URL that was scraped.
    pub url: String,
    /// Page content (may be empty).
    pub content: String,
    /// HTTP status from the provider, when a response arrived.
    pub status_code: Option<u16>,
    /// Credits consumed across all attempted modes.
    pub credits_consumed: u32,
    /// The mode that produced this response.
    pub mode: ScrapeMode,
    /// Set when the ladder ended in failure.
    pub error: Option<ProviderError>,
}

impl ScrapeResponse {
    /// True when the ladder ended without an error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Scraping operations.
#[async_trait]
pub trait ScrapeApi: Send + Sync {
    /// Run the fallback ladder for one URL. Never fails out-of-band.
    async fn scrape_with_fallback(&self, url: &str) -> ScrapeResponse;

    /// Scrape a batch of URLs under bounded concurrency, preserving input
    /// order.
    async fn scrape_batch(&self, urls: &[String]) -> Vec<ScrapeResponse>;
}

/// What the ladder does with a mode's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LadderDecision {
    /// Terminal success (2xx, or 404 treated as valid not-found).
    Accept,
    /// Non-permanent failure: try the next mode.
    Advance,
    /// Permanent failure (400/401/403): stop, skip remaining modes.
    Stop,
}

fn ladder_decision(status: Option<u16>) -> LadderDecision {
    match status {
        Some(s) if (200..300).contains(&s) => LadderDecision::Accept,
        Some(404) => LadderDecision::Accept,
        Some(400 | 401 | 403) => LadderDecision::Stop,
        _ => LadderDecision::Advance,
    }
}

/// HTTP client for the scraping proxy.
pub struct ScrapeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    country_code: String,
    timeout: Duration,
    batch_executor: FanoutExecutor,
}

impl ScrapeClient {
    /// Create a client for the default endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            batch_executor: FanoutExecutor::new(BATCH_CAP),
        }
    }

    /// Override the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the geo code used by the geo-rendered mode.
    #[must_use]
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    /// Override the per-call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue one request in the given mode.
    async fn scrape_mode(&self, target: &str, mode: ScrapeMode) -> ScrapeResponse {
        let mut request_url = match url::Url::parse(&self.base_url) {
            Ok(u) => u,
            Err(e) => {
                return ScrapeResponse {
                    url: target.to_string(),
                    content: String::new(),
                    status_code: None,
                    credits_consumed: 0,
                    mode,
                    error: Some(ProviderError::classify_message(&format!(
                        "bad scraper base URL: {e}"
                    ))),
                };
            },
        };
        {
            let mut pairs = request_url.query_pairs_mut();
            pairs.append_pair("api_key", &self.api_key);
            pairs.append_pair("url", target);
            match mode {
                ScrapeMode::Basic => {},
                ScrapeMode::Javascript => {
                    pairs.append_pair("render", "true");
                },
                ScrapeMode::JavascriptGeo => {
                    pairs.append_pair("render", "true");
                    pairs.append_pair("country_code", &self.country_code);
                },
            }
        }

        let result = self
            .client
            .get(request_url)
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let content = response.text().await.unwrap_or_default();
                let error = if (200..300).contains(&status) || status == 404 {
                    None
                } else {
                    Some(ProviderError::from_status(
                        status,
                        format!("scrape of {target} returned {status}"),
                    ))
                };
                ScrapeResponse {
                    url: target.to_string(),
                    content,
                    status_code: Some(status),
                    credits_consumed: mode.credit_cost(),
                    mode,
                    error,
                }
            },
            Err(e) => ScrapeResponse {
                url: target.to_string(),
                content: String::new(),
                status_code: None,
                credits_consumed: 0,
                mode,
                error: Some(classify_reqwest(&e)),
            },
        }
    }
}

#[async_trait]
impl ScrapeApi for ScrapeClient {
    async fn scrape_with_fallback(&self, url: &str) -> ScrapeResponse {
        let mut credits = 0;
        let mut last: Option<ScrapeResponse> = None;

        for (step, mode) in ScrapeMode::LADDER.iter().copied().enumerate() {
            let mut response = self.scrape_mode(url, mode).await;
            credits += response.credits_consumed;
            response.credits_consumed = credits;

            match ladder_decision(response.status_code) {
                LadderDecision::Accept => {
                    debug!(url, mode = ?mode, status = ?response.status_code, "scrape accepted");
                    return response;
                },
                LadderDecision::Stop => {
                    warn!(url, mode = ?mode, status = ?response.status_code,
                        "permanent scrape failure; skipping remaining modes");
                    return response;
                },
                LadderDecision::Advance => {
                    if step + 1 < ScrapeMode::LADDER.len() {
                        debug!(url, mode = ?mode, status = ?response.status_code,
                            "scrape mode failed; escalating");
                    }
                    last = Some(response);
                },
            }
        }

        // All modes exhausted; return the last attempt's result.
        last.unwrap_or_else(|| ScrapeResponse {
            url: url.to_string(),
            content: String::new(),
            status_code: None,
            credits_consumed: credits,
            mode: ScrapeMode::JavascriptGeo,
            error: Some(ProviderError::classify_message("scrape ladder produced no result")),
        })
    }

    async fn scrape_batch(&self, urls: &[String]) -> Vec<ScrapeResponse> {
        let mut all = Vec::with_capacity(urls.len());

        for (window_index, window) in urls.chunks(self.batch_executor.max_in_flight()).enumerate() {
            if window_index > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            let results = self
                .batch_executor
                .run(window.to_vec(), |_, url| async move {
                    Ok(self.scrape_with_fallback(&url).await)
                })
                .await;

            for (i, result) in results.into_iter().enumerate() {
                all.push(result.unwrap_or_else(|e| ScrapeResponse {
                    url: window.get(i).cloned().unwrap_or_default(),
                    content: String::new(),
                    status_code: None,
                    credits_consumed: 0,
                    mode: ScrapeMode::Basic,
                    error: Some(e),
                }));
            }
        }

        all
    }
}

impl std::fmt::Debug for ScrapeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeClient")
            .field("base_url", &self.base_url)
            .field("country_code", &self.country_code)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
