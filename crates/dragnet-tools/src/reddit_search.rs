//! Reddit-scoped search with cross-query CTR-weighted ranking.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_core::retry::{RetryPolicy, run_with_retry};
use dragnet_providers::search::{SearchApi, SearchOutcome, TimeFilter};

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, parse_args};
use crate::ranking::{RankingConfig, rank_urls};

const MIN_QUERIES: usize = 1;
const MAX_QUERIES: usize = 10;

#[derive(Deserialize)]
struct RedditSearchArgs {
    queries: Vec<String>,
    #[serde(default)]
    time_filter: Option<String>,
}

/// Reddit-scoped search aggregating up to 10 queries into one ranking.
pub struct RedditSearchTool {
    search: Arc<dyn SearchApi>,
    policy: RetryPolicy,
    ranking: RankingConfig,
}

impl RedditSearchTool {
    /// Create the tool over a search adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchApi>) -> Self {
        Self {
            search,
            policy: RetryPolicy::search(),
            ranking: RankingConfig::default(),
        }
    }

    /// Override the ranking parameters.
    #[must_use]
    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    /// Override the retry policy (used by tests).
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ToolHandler for RedditSearchTool {
    fn name(&self) -> &'static str {
        "reddit_search"
    }

    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput {
        let args: RedditSearchArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) =
            check_batch_size("queries", args.queries.len(), MIN_QUERIES, MAX_QUERIES)
        {
            return output;
        }

        let time_filter = match args.time_filter.as_deref() {
            None => None,
            Some(raw) => match TimeFilter::parse(raw) {
                Some(filter) => Some(filter),
                None => {
                    let error = ProviderError::new(
                        ErrorKind::InvalidInput,
                        format!("unknown time filter: {raw} (expected hour/day/week/month/year)"),
                    );
                    return HandlerOutput::failure("Invalid request", &error);
                },
            },
        };

        // One batched provider call covers every query; the whole batch
        // retries as a unit under the search policy.
        let search_ref = &self.search;
        let queries_ref = &args.queries;
        let outcome = run_with_retry(
            |_| async move { search_ref.search_reddit_batch(queries_ref, time_filter).await },
            &self.policy,
            cancel,
        )
        .await;

        let retries = outcome.retries();
        let outcomes = match outcome.into_result() {
            Ok(outcomes) => outcomes,
            Err(error) => return HandlerOutput::failure("Reddit search failed", &error),
        };

        let ranked = rank_urls(&outcomes, &self.ranking);
        info!(
            queries = outcomes.len(),
            consensus = ranked.consensus.len(),
            ranked = ranked.all.len(),
            retries,
            "reddit search complete"
        );

        let total_results: usize = outcomes.iter().map(|o| o.results.len()).sum();
        let body = render_body(&outcomes, &ranked, retries, self.ranking.consensus_threshold);
        let metadata = serde_json::json!({
            "tool": self.name(),
            "queries": outcomes.len(),
            "total_results": total_results,
            "consensus": ranked.consensus.len(),
            "ranked": ranked.all.len(),
            "retries": retries,
            "consensus_threshold": self.ranking.consensus_threshold,
        });

        HandlerOutput::success(body, metadata)
    }
}

fn render_body(
    outcomes: &[SearchOutcome],
    ranked: &crate::ranking::RankedResults,
    retries: u32,
    threshold: usize,
) -> String {
    let mut body = String::from("# Reddit Search Results\n\n");
    let _ = writeln!(body, "**Queries:** {} | **Retries:** {retries}\n", outcomes.len());

    let _ = writeln!(body, "## Consensus (in ≥ {threshold} queries)\n");
    if ranked.consensus.is_empty() {
        body.push_str("No URL appeared in enough queries.\n\n");
    } else {
        for (i, url) in ranked.consensus.iter().enumerate() {
            let _ = writeln!(
                body,
                "{}. **[{}]({})** — score {:.3}, seen in {} queries",
                i + 1,
                url.title,
                url.url,
                url.score,
                url.query_count
            );
        }
        body.push('\n');
    }

    body.push_str("## All ranked URLs\n\n");
    for (i, url) in ranked.all.iter().enumerate() {
        let _ = writeln!(
            body,
            "{}. [{}]({}) — score {:.3}, {} appearance(s)",
            i + 1,
            url.title,
            url.url,
            url.score,
            url.appearances
        );
    }
    body.push('\n');

    // The raw per-query lists, verbatim.
    for outcome in outcomes {
        let _ = writeln!(body, "### {}\n", outcome.query);
        if outcome.results.is_empty() {
            body.push_str("No results.\n\n");
            continue;
        }
        for hit in &outcome.results {
            let _ = writeln!(body, "{}. [{}]({})", hit.position + 1, hit.title, hit.url);
        }
        body.push('\n');
    }

    body
}
