//! Web-search tool: fans keywords out to the search provider.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_core::fanout::FanoutExecutor;
use dragnet_core::retry::{RetryPolicy, run_with_retry};
use dragnet_providers::search::{SearchApi, SearchOutcome};

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, parse_args};

const MIN_KEYWORDS: usize = 1;
const MAX_KEYWORDS: usize = 20;

#[derive(Deserialize)]
struct WebSearchArgs {
    keywords: Vec<String>,
}

/// Per-keyword aggregation record.
struct KeywordResult {
    query: String,
    outcome: Result<SearchOutcome, ProviderError>,
    retries: u32,
    rate_limit_hits: u32,
}

/// Batched web search across up to 20 keywords.
pub struct WebSearchTool {
    search: Arc<dyn SearchApi>,
    policy: RetryPolicy,
}

impl WebSearchTool {
    /// Create the tool over a search adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchApi>) -> Self {
        Self {
            search,
            policy: RetryPolicy::search(),
        }
    }

    /// Override the retry policy (used by tests).
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn search_keyword(
        &self,
        keyword: String,
        cancel: &CancellationToken,
    ) -> KeywordResult {
        let rate_hits = AtomicU32::new(0);
        let rate_ref = &rate_hits;
        let search_ref = &self.search;
        let keyword_ref = &keyword;

        let outcome = run_with_retry(
            |_| async move {
                match search_ref.search_batch(std::slice::from_ref(keyword_ref)).await {
                    Ok(mut batch) if !batch.is_empty() => Ok(batch.remove(0)),
                    Ok(_) => Err(ProviderError::new(
                        ErrorKind::Parse,
                        "search returned an empty batch",
                    )),
                    Err(e) => {
                        if e.kind == ErrorKind::RateLimited {
                            rate_ref.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e)
                    },
                }
            },
            &self.policy,
            cancel,
        )
        .await;

        let retries = outcome.retries();
        let result = outcome.into_result();
        KeywordResult {
            query: keyword,
            outcome: result,
            retries,
            rate_limit_hits: rate_hits.into_inner(),
        }
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput {
        let args: WebSearchArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) =
            check_batch_size("keywords", args.keywords.len(), MIN_KEYWORDS, MAX_KEYWORDS)
        {
            return output;
        }

        let n = args.keywords.len();
        let executor = FanoutExecutor::new(n);
        let results = executor
            .run(args.keywords, |_, keyword| async move {
                Ok(self.search_keyword(keyword, cancel).await)
            })
            .await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut retries = 0u32;
        let mut rate_limit_hits = 0u32;
        let mut total_results = 0usize;

        let mut sections = String::new();
        for result in &results {
            match result {
                Ok(keyword) => {
                    retries += keyword.retries;
                    rate_limit_hits += keyword.rate_limit_hits;
                    match &keyword.outcome {
                        Ok(outcome) => {
                            succeeded += 1;
                            total_results += outcome.results.len();
                            render_outcome(&mut sections, outcome);
                        },
                        Err(error) => {
                            failed += 1;
                            let _ = writeln!(
                                sections,
                                "## {}\n\n❌ Failed: {error}\n",
                                keyword.query
                            );
                        },
                    }
                },
                // A panic inside a task; the executor already classified it.
                Err(error) => {
                    failed += 1;
                    let _ = writeln!(sections, "❌ Failed: {error}\n");
                },
            }
        }

        info!(keywords = n, succeeded, failed, retries, "web search complete");

        let mut body = String::from("# Web Search Results\n\n");
        let _ = writeln!(body, "**Keywords searched:** {n}");
        let _ = writeln!(body, "**Total results:** {total_results}");
        let _ = writeln!(
            body,
            "**Succeeded:** {succeeded} | **Failed:** {failed} | **Retries:** {retries} | **Rate limits hit:** {rate_limit_hits}\n"
        );
        body.push_str(&sections);

        let all_failed = succeeded == 0;
        let metadata = serde_json::json!({
            "tool": self.name(),
            "keywords": n,
            "total_results": total_results,
            "succeeded": succeeded,
            "failed": failed,
            "retries": retries,
            "rate_limit_hits": rate_limit_hits,
        });

        if all_failed {
            let error = ProviderError::new(ErrorKind::Internal, "every keyword search failed");
            let mut output = HandlerOutput::failure("Web search failed", &error);
            output.body.push('\n');
            output.body.push_str(&sections);
            output.metadata = metadata;
            return output;
        }

        HandlerOutput::success(body, metadata)
    }
}

fn render_outcome(out: &mut String, outcome: &SearchOutcome) {
    let _ = writeln!(out, "## {}\n", outcome.query);
    if outcome.results.is_empty() {
        out.push_str("No results.\n\n");
        return;
    }
    for hit in &outcome.results {
        let _ = writeln!(out, "{}. [{}]({})", hit.position + 1, hit.title, hit.url);
        if !hit.snippet.is_empty() {
            let _ = writeln!(out, "   {}", hit.snippet);
        }
    }
    if outcome.total_results > 0 {
        let _ = writeln!(out, "\n_~{} total results_", outcome.total_results);
    }
    if !outcome.related_queries.is_empty() {
        let _ = writeln!(out, "\nRelated: {}", outcome.related_queries.join(", "));
    }
    out.push('\n');
}
