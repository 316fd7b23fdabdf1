//! Reddit post-fetch tool: splits a comment budget across a batch of posts.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_core::budget::CommentAllocation;
use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_core::fanout::FanoutExecutor;
use dragnet_core::retry::{RetryPolicy, run_with_retry};
use dragnet_providers::reddit::{RedditApi, RedditPost};

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, credential_hint, parse_args};

const MIN_URLS: usize = 2;
const MAX_URLS: usize = 50;

/// Comment budget shared across one batch of posts.
const COMMENT_BUDGET: u32 = 1000;

/// Provider-imposed ceiling on comments per request.
const REQUEST_CAP: u32 = 500;

/// Provider-safe fan-out for the Reddit API.
const FANOUT_CAP: usize = 5;

#[derive(Deserialize)]
struct RedditPostsArgs {
    urls: Vec<String>,
}

struct PostResult {
    url: String,
    outcome: Result<RedditPost, ProviderError>,
    retries: u32,
}

/// Fetches a batch of Reddit posts with their top comments.
pub struct RedditPostsTool {
    reddit: Arc<dyn RedditApi>,
    policy: RetryPolicy,
}

impl RedditPostsTool {
    /// Create the tool over a Reddit adapter.
    #[must_use]
    pub fn new(reddit: Arc<dyn RedditApi>) -> Self {
        Self {
            reddit,
            policy: RetryPolicy::api(),
        }
    }

    /// Override the retry policy (used by tests).
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_one(
        &self,
        url: String,
        comment_limit: u32,
        cancel: &CancellationToken,
    ) -> PostResult {
        let reddit_ref = &self.reddit;
        let url_ref = &url;
        let outcome = run_with_retry(
            |_| async move { reddit_ref.fetch_post(url_ref, comment_limit).await },
            &self.policy,
            cancel,
        )
        .await;

        let retries = outcome.retries();
        PostResult {
            outcome: outcome.into_result(),
            url,
            retries,
        }
    }
}

#[async_trait]
impl ToolHandler for RedditPostsTool {
    fn name(&self) -> &'static str {
        "reddit_posts"
    }

    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput {
        let args: RedditPostsArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) = check_batch_size("urls", args.urls.len(), MIN_URLS, MAX_URLS) {
            return output;
        }

        let n = args.urls.len();
        let allocation = CommentAllocation::split(COMMENT_BUDGET, n, REQUEST_CAP);

        let executor = FanoutExecutor::new(FANOUT_CAP);
        let results = executor
            .run(args.urls, |_, url| async move {
                Ok(self.fetch_one(url, allocation.per_item_capped, cancel).await)
            })
            .await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut retries = 0u32;
        let mut comments_fetched = 0usize;
        let mut credential_failure = false;

        let mut sections = String::new();
        for result in &results {
            match result {
                Ok(post) => {
                    retries += post.retries;
                    match &post.outcome {
                        Ok(fetched) => {
                            succeeded += 1;
                            comments_fetched += fetched.comments.len();
                            render_post(&mut sections, fetched);
                        },
                        Err(error) => {
                            failed += 1;
                            credential_failure |= error.is_credential_failure();
                            let _ = writeln!(sections, "❌ Failed: {} — {error}\n", post.url);
                        },
                    }
                },
                Err(error) => {
                    failed += 1;
                    let _ = writeln!(sections, "❌ Failed: {error}\n");
                },
            }
        }

        info!(posts = n, succeeded, failed, retries, "reddit post fetch complete");

        let mut body = String::from("# Reddit Posts\n\n");
        let _ = writeln!(body, "**Posts:** {n} | **Comments fetched:** {comments_fetched}");
        let _ = writeln!(
            body,
            "**Comment Allocation:** {} comments/post (budget {} across {n} posts)",
            allocation.per_item, allocation.total
        );
        let _ = writeln!(
            body,
            "**Succeeded:** {succeeded} | **Failed:** {failed} | **Retries:** {retries}\n"
        );
        if credential_failure {
            let _ = writeln!(
                body,
                "{}\n",
                credential_hint("REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET")
            );
        }
        body.push_str(&sections);

        let metadata = serde_json::json!({
            "tool": self.name(),
            "posts": n,
            "comments_fetched": comments_fetched,
            "allocation": allocation,
            "succeeded": succeeded,
            "failed": failed,
            "retries": retries,
        });

        if succeeded == 0 {
            let error = ProviderError::new(ErrorKind::Internal, "every post fetch failed");
            let mut output = HandlerOutput::failure("Reddit fetch failed", &error);
            output.body.push('\n');
            output.body.push_str(&sections);
            output.metadata = metadata;
            return output;
        }

        HandlerOutput::success(body, metadata)
    }
}

fn render_post(out: &mut String, post: &RedditPost) {
    let meta = &post.metadata;
    let _ = writeln!(out, "## {} (r/{})\n", meta.title, meta.subreddit);
    let _ = writeln!(
        out,
        "by u/{} — score {}, {:.0}% upvoted, {} comments on site",
        meta.author,
        meta.score,
        meta.upvote_ratio * 100.0,
        meta.num_comments
    );
    if !meta.selftext.is_empty() {
        let _ = writeln!(out, "\n> {}", excerpt(&meta.selftext, 400));
    }
    if post.comments.is_empty() {
        out.push_str("\n_No comments fetched._\n\n");
        return;
    }
    let _ = writeln!(out, "\n### Top comments ({})\n", post.comments.len());
    for comment in &post.comments {
        let indent = "  ".repeat(comment.depth as usize);
        let _ = writeln!(
            out,
            "{indent}- **u/{}** ({}): {}",
            comment.author,
            comment.score,
            excerpt(&comment.body, 300)
        );
    }
    out.push('\n');
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flattened = text.replace('\n', " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let cut: String = flattened.chars().take(max_chars).collect();
    format!("{cut}…")
}
