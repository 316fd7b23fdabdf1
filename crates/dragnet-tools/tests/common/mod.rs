//! Stub provider adapters for handler tests. No network anywhere.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dragnet_core::error::{ErrorKind, ProviderError, ProviderResult};
use dragnet_providers::llm::{CompletionApi, ExtractionRequest, ExtractionResponse};
use dragnet_providers::reddit::{PostMetadata, RedditApi, RedditComment, RedditPost};
use dragnet_providers::scraper::{ScrapeApi, ScrapeMode, ScrapeResponse};
use dragnet_providers::search::{SearchApi, SearchHit, SearchOutcome, TimeFilter};

/// Search stub: N fixed results per query, with optional one-shot 429s.
pub struct StubSearch {
    pub results_per_query: usize,
    /// Queries that fail with a 429 on their first attempt only.
    pub rate_limit_once: Mutex<HashMap<String, bool>>,
    pub total_attempts: AtomicU32,
}

impl StubSearch {
    pub fn new(results_per_query: usize) -> Self {
        Self {
            results_per_query,
            rate_limit_once: Mutex::new(HashMap::new()),
            total_attempts: AtomicU32::new(0),
        }
    }

    pub fn rate_limit_once_for(self, query: &str) -> Self {
        self.rate_limit_once
            .lock()
            .unwrap()
            .insert(query.to_string(), false);
        self
    }

    fn respond(&self, query: &str) -> ProviderResult<SearchOutcome> {
        self.total_attempts.fetch_add(1, Ordering::SeqCst);

        let mut pending = self.rate_limit_once.lock().unwrap();
        if let Some(tripped) = pending.get_mut(query) {
            if !*tripped {
                *tripped = true;
                return Err(ProviderError::from_status(429, "slow down"));
            }
        }

        Ok(SearchOutcome {
            query: query.to_string(),
            results: (0..self.results_per_query)
                .map(|position| SearchHit {
                    title: format!("{query} result {position}"),
                    url: format!("https://example.com/{query}/{position}"),
                    snippet: format!("snippet about {query}"),
                    position,
                })
                .collect(),
            total_results: self.results_per_query as u64,
            related_queries: Vec::new(),
            error: None,
        })
    }
}

#[async_trait]
impl SearchApi for StubSearch {
    async fn search_batch(&self, queries: &[String]) -> ProviderResult<Vec<SearchOutcome>> {
        queries.iter().map(|q| self.respond(q)).collect()
    }

    async fn search_reddit_batch(
        &self,
        queries: &[String],
        _time_filter: Option<TimeFilter>,
    ) -> ProviderResult<Vec<SearchOutcome>> {
        self.search_batch(queries).await
    }
}

/// Reddit stub: records the comment limit it was asked for.
pub struct StubReddit {
    pub requested_limits: Mutex<Vec<u32>>,
    pub calls: AtomicU32,
}

impl StubReddit {
    pub fn new() -> Self {
        Self {
            requested_limits: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RedditApi for StubReddit {
    async fn fetch_post(&self, url: &str, comment_limit: u32) -> ProviderResult<RedditPost> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_limits.lock().unwrap().push(comment_limit);
        Ok(RedditPost {
            metadata: PostMetadata {
                title: format!("post at {url}"),
                author: "someone".into(),
                subreddit: "testing".into(),
                score: 10,
                upvote_ratio: 0.9,
                num_comments: 3,
                selftext: String::new(),
                permalink: url.to_string(),
            },
            comments: vec![RedditComment {
                author: "commenter".into(),
                body: "a comment".into(),
                score: 5,
                depth: 0,
            }],
            allocated_comments: comment_limit,
        })
    }
}

/// Scrape stub: per-URL canned outcomes, defaulting to success.
pub struct StubScrape {
    pub auth_failure: bool,
    pub calls: AtomicU32,
}

impl StubScrape {
    pub fn new() -> Self {
        Self {
            auth_failure: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_auth() -> Self {
        Self {
            auth_failure: true,
            calls: AtomicU32::new(0),
        }
    }

    fn respond(&self, url: &str) -> ScrapeResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_failure {
            return ScrapeResponse {
                url: url.to_string(),
                content: String::new(),
                status_code: Some(401),
                credits_consumed: 1,
                mode: ScrapeMode::Basic,
                error: Some(ProviderError::from_status(401, "bad api key")),
            };
        }
        ScrapeResponse {
            url: url.to_string(),
            content: format!("content of {url}"),
            status_code: Some(200),
            credits_consumed: 1,
            mode: ScrapeMode::Basic,
            error: None,
        }
    }
}

#[async_trait]
impl ScrapeApi for StubScrape {
    async fn scrape_with_fallback(&self, url: &str) -> ScrapeResponse {
        self.respond(url)
    }

    async fn scrape_batch(&self, urls: &[String]) -> Vec<ScrapeResponse> {
        urls.iter().map(|u| self.respond(u)).collect()
    }
}

/// LLM stub: echoes an answer, or simulates the empty-response failure for
/// prompts containing a marker.
pub struct StubLlm {
    pub empty_for_marker: Option<String>,
    pub calls: AtomicU32,
}

impl StubLlm {
    pub fn new() -> Self {
        Self {
            empty_for_marker: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn empty_for(marker: &str) -> Self {
        Self {
            empty_for_marker: Some(marker.to_string()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CompletionApi for StubLlm {
    async fn extract(
        &self,
        request: ExtractionRequest,
        _cancel: &CancellationToken,
    ) -> ExtractionResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.empty_for_marker {
            if request.prompt.contains(marker) {
                return ExtractionResponse {
                    content: request.content,
                    processed: false,
                    model: "stub".into(),
                    tokens_used: None,
                    error: Some(
                        ProviderError::new(ErrorKind::Internal, "Empty response received")
                            .with_retryable(false),
                    ),
                };
            }
        }
        ExtractionResponse {
            content: format!("extracted: {}", request.prompt),
            processed: true,
            model: "stub".into(),
            tokens_used: Some(50),
            error: None,
        }
    }
}
