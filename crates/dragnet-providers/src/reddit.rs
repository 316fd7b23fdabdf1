//! Reddit adapter: OAuth'd post and comment-tree fetching.
//!
//! The adapter holds a single cached access token with an expiry timestamp,
//! refreshed when expired or within a safety window of expiring. Refreshes
//! are single-flight: the cache lock is held across the token request, so
//! racing callers wait for the one in-flight refresh instead of issuing
//! their own.
//!
//! Comment trees come back score-sorted and depth-capped; flattening is
//! depth-first with parents before children and siblings in descending
//! score order, stopping once the allocated comment count is reached.
//! Deleted-author nodes are dropped.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use dragnet_core::error::{ErrorKind, ProviderError, ProviderResult};

use crate::http::{DEFAULT_TIMEOUT, USER_AGENT, classify_reqwest};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";

/// Refresh the token this long before it actually expires.
const TOKEN_SAFETY_WINDOW: Duration = Duration::from_secs(60);

/// Maximum comment-tree depth requested from the provider.
const MAX_COMMENT_DEPTH: u32 = 10;

/// Metadata for a fetched post.
#[derive(Debug, Clone, Serialize)]
pub struct PostMetadata {
    /// Post title.
    pub title: String,
    /// Author username.
    pub author: String,
    /// Subreddit (without the `r/` prefix).
    pub subreddit: String,
    /// Net score.
    pub score: i64,
    /// Upvote ratio in `[0, 1]`.
    pub upvote_ratio: f64,
    /// Provider-reported total comment count.
    pub num_comments: u64,
    /// Self-text body, empty for link posts.
    pub selftext: String,
    /// Canonical permalink.
    pub permalink: String,
}

/// One flattened comment.
#[derive(Debug, Clone, Serialize)]
pub struct RedditComment {
    /// Author username.
    pub author: String,
    /// Comment body (Markdown as the provider returns it).
    pub body: String,
    /// Net score.
    pub score: i64,
    /// 0-indexed depth in the tree.
    pub depth: u32,
}

/// A fetched post with its flattened comments.
#[derive(Debug, Clone, Serialize)]
pub struct RedditPost {
    /// Post metadata.
    pub metadata: PostMetadata,
    /// Comments, parent-before-children, siblings by descending score.
    pub comments: Vec<RedditComment>,
    /// The comment count that was allocated to this post.
    pub allocated_comments: u32,
}

/// Reddit operations.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// Fetch a post and up to `comment_limit` of its comments.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unparseable post URL, and the
    /// classified provider error for transport or status failures.
    async fn fetch_post(&self, url: &str, comment_limit: u32) -> ProviderResult<RedditPost>;
}

/// Parsed location of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PostRef {
    pub(crate) subreddit: String,
    pub(crate) post_id: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .checked_duration_since(Instant::now())
            .is_some_and(|left| left > TOKEN_SAFETY_WINDOW)
    }
}

/// HTTP client for the Reddit OAuth API.
pub struct RedditClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    /// Create a client from application credentials.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            token: Mutex::new(None),
        }
    }

    /// Override the API base URL.
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

    /// Get a valid access token, refreshing single-flight when needed.
    ///
    /// The lock is held for the duration of a refresh so concurrent callers
    /// serialize on one request; the freshness check repeats under the lock,
    /// so a caller that waited finds the token its predecessor fetched.
    async fn access_token(&self) -> ProviderResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        debug!("refreshing reddit access token");
        let refreshed = self.request_token().await?;
        let value = refreshed.value.clone();
        *cached = Some(refreshed);
        Ok(value)
    }

    async fn request_token(&self) -> ProviderResult<CachedToken> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("reddit token request failed: {body}"),
            ));
        }

        let body: Value = response.json().await.map_err(|e| classify_reqwest(&e))?;
        let value = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::new(ErrorKind::Parse, "token response missing access_token")
            })?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        Ok(CachedToken {
            value,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }

    /// Drop the cached token (after a 401, the next call re-authenticates).
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn fetch_post(&self, url: &str, comment_limit: u32) -> ProviderResult<RedditPost> {
        let post_ref = parse_post_url(url)?;
        let token = self.access_token().await?;

        let mut request_url = url::Url::parse(&self.base_url)
            .and_then(|u| {
                u.join(&format!(
                    "/r/{}/comments/{}.json",
                    post_ref.subreddit, post_ref.post_id
                ))
            })
            .map_err(|e| {
                ProviderError::new(ErrorKind::Internal, format!("bad reddit base URL: {e}"))
            })?;
        request_url
            .query_pairs_mut()
            .append_pair("sort", "top")
            .append_pair("depth", &MAX_COMMENT_DEPTH.to_string())
            .append_pair("limit", &comment_limit.to_string())
            .append_pair("raw_json", "1");

        let response = self
            .client
            .get(request_url)
            .bearer_auth(&token)
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 {
                self.invalidate_token().await;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("reddit fetch failed for r/{}: {body}", post_ref.subreddit),
            ));
        }

        let listings: Value = response.json().await.map_err(|e| classify_reqwest(&e))?;
        parse_post_response(&listings, comment_limit)
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Parse a post URL into its subreddit and post id.
///
/// Accepts the canonical `/r/{subreddit}/comments/{id}/...` path on any
/// reddit host; everything else is `InvalidInput`.
pub(crate) fn parse_post_url(raw: &str) -> ProviderResult<PostRef> {
    let invalid =
        || ProviderError::new(ErrorKind::InvalidInput, format!("not a reddit post URL: {raw}"));

    let url = url::Url::parse(raw).map_err(|_| invalid())?;
    if !url
        .host_str()
        .is_some_and(|h| h == "reddit.com" || h.ends_with(".reddit.com"))
    {
        return Err(invalid());
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["r", subreddit, "comments", post_id, ..] if !subreddit.is_empty() && !post_id.is_empty() => {
            Ok(PostRef {
                subreddit: (*subreddit).to_string(),
                post_id: (*post_id).to_string(),
            })
        },
        _ => Err(invalid()),
    }
}

/// Decode the two-listing response (post, comments) into a [`RedditPost`].
fn parse_post_response(listings: &Value, comment_limit: u32) -> ProviderResult<RedditPost> {
    let post_data = listings
        .get(0)
        .and_then(|l| l.pointer("/data/children/0/data"))
        .ok_or_else(|| ProviderError::new(ErrorKind::Parse, "post listing missing"))?;

    let metadata = PostMetadata {
        title: str_field(post_data, "title"),
        author: str_field(post_data, "author"),
        subreddit: str_field(post_data, "subreddit"),
        score: post_data.get("score").and_then(Value::as_i64).unwrap_or(0),
        upvote_ratio: post_data
            .get("upvote_ratio")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        num_comments: post_data
            .get("num_comments")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        selftext: str_field(post_data, "selftext"),
        permalink: str_field(post_data, "permalink"),
    };

    let mut comments = Vec::new();
    if let Some(children) = listings
        .get(1)
        .and_then(|l| l.pointer("/data/children"))
        .and_then(Value::as_array)
    {
        flatten_comments(children, 0, comment_limit as usize, &mut comments);
    } else {
        warn!("comment listing missing; returning post without comments");
    }

    Ok(RedditPost {
        metadata,
        comments,
        allocated_comments: comment_limit,
    })
}

/// Depth-first flatten: parent before children, siblings by descending
/// score, deleted authors skipped, stopping at `limit` comments or
/// [`MAX_COMMENT_DEPTH`] levels.
fn flatten_comments(children: &[Value], depth: u32, limit: usize, out: &mut Vec<RedditComment>) {
    if depth >= MAX_COMMENT_DEPTH || out.len() >= limit {
        return;
    }

    // The provider usually sorts for us; re-sorting keeps the ordering
    // invariant independent of upstream behavior.
    let mut nodes: Vec<&Value> = children
        .iter()
        .filter(|c| c.get("kind").and_then(Value::as_str) == Some("t1"))
        .collect();
    nodes.sort_by_key(|c| {
        std::cmp::Reverse(c.pointer("/data/score").and_then(Value::as_i64).unwrap_or(0))
    });

    for node in nodes {
        if out.len() >= limit {
            return;
        }
        let Some(data) = node.get("data") else { continue };

        let author = str_field(data, "author");
        let deleted = author.is_empty() || author == "[deleted]";
        if !deleted {
            out.push(RedditComment {
                author,
                body: str_field(data, "body"),
                score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
                depth,
            });
        }

        // `replies` is the empty string on leaves.
        if let Some(replies) = data
            .pointer("/replies/data/children")
            .and_then(Value::as_array)
        {
            flatten_comments(replies, depth + 1, limit, out);
        }
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(author: &str, score: i64, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "author": author,
                "body": format!("body of {author}"),
                "score": score,
                "replies": replies,
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children}})
    }

    #[test]
    fn parse_post_url_accepts_canonical_form() {
        let parsed =
            parse_post_url("https://www.reddit.com/r/rust/comments/abc123/some_title/").unwrap();
        assert_eq!(parsed.subreddit, "rust");
        assert_eq!(parsed.post_id, "abc123");
    }

    #[test]
    fn parse_post_url_accepts_old_reddit() {
        let parsed = parse_post_url("https://old.reddit.com/r/ask/comments/xyz9").unwrap();
        assert_eq!(parsed.subreddit, "ask");
        assert_eq!(parsed.post_id, "xyz9");
    }

    #[test]
    fn parse_post_url_rejects_non_reddit_hosts() {
        let err = parse_post_url("https://example.com/r/rust/comments/abc123").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn parse_post_url_rejects_non_post_paths() {
        for bad in [
            "https://reddit.com/r/rust",
            "https://reddit.com/user/someone",
            "not a url at all",
            "https://reddit.com/r//comments/abc",
        ] {
            let err = parse_post_url(bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidInput, "{bad}");
        }
    }

    #[test]
    fn flatten_orders_parent_before_children() {
        let children = vec![comment(
            "parent",
            50,
            listing(vec![comment("child", 99, json!(""))]),
        )];
        let mut out = Vec::new();
        flatten_comments(&children, 0, 10, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].author, "parent");
        assert_eq!(out[0].depth, 0);
        assert_eq!(out[1].author, "child");
        assert_eq!(out[1].depth, 1);
    }

    #[test]
    fn flatten_sorts_siblings_by_descending_score() {
        let children = vec![
            comment("low", 1, json!("")),
            comment("high", 100, json!("")),
            comment("mid", 10, json!("")),
        ];
        let mut out = Vec::new();
        flatten_comments(&children, 0, 10, &mut out);
        let order: Vec<&str> = out.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn flatten_stops_at_limit() {
        let children: Vec<Value> = (0..20)
            .map(|i| comment(&format!("u{i}"), 20 - i, json!("")))
            .collect();
        let mut out = Vec::new();
        flatten_comments(&children, 0, 5, &mut out);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn flatten_skips_deleted_authors_without_charging_the_limit() {
        let children = vec![
            comment("[deleted]", 500, listing(vec![comment("survivor", 5, json!(""))])),
            comment("visible", 50, json!("")),
        ];
        let mut out = Vec::new();
        flatten_comments(&children, 0, 10, &mut out);
        let authors: Vec<&str> = out.iter().map(|c| c.author.as_str()).collect();
        // The deleted parent is dropped but its subtree still contributes.
        assert_eq!(authors, vec!["survivor", "visible"]);
    }

    #[test]
    fn flatten_caps_depth() {
        // Build a chain deeper than the cap.
        let mut node = comment("leaf", 1, json!(""));
        for i in (0..15).rev() {
            node = comment(&format!("level{i}"), 1, listing(vec![node]));
        }
        let mut out = Vec::new();
        flatten_comments(&[node], 0, 100, &mut out);
        assert!(out.len() <= MAX_COMMENT_DEPTH as usize);
        assert!(out.iter().all(|c| c.depth < MAX_COMMENT_DEPTH));
    }

    #[test]
    fn parse_post_response_extracts_metadata_and_comments() {
        let listings = json!([
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {
                "title": "Interesting question",
                "author": "asker",
                "subreddit": "rust",
                "score": 321,
                "upvote_ratio": 0.97,
                "num_comments": 2,
                "selftext": "details",
                "permalink": "/r/rust/comments/abc123/interesting_question/"
            }}]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {"author": "a", "body": "top answer", "score": 40, "replies": ""}},
                {"kind": "t1", "data": {"author": "b", "body": "other", "score": 3, "replies": ""}}
            ]}}
        ]);
        let post = parse_post_response(&listings, 100).unwrap();
        assert_eq!(post.metadata.title, "Interesting question");
        assert_eq!(post.metadata.score, 321);
        assert_eq!(post.comments.len(), 2);
        assert_eq!(post.comments[0].author, "a");
        assert_eq!(post.allocated_comments, 100);
    }

    #[test]
    fn parse_post_response_missing_post_is_parse_error() {
        let err = parse_post_response(&json!([]), 10).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }

    #[test]
    fn cached_token_freshness_window() {
        let fresh = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(fresh.is_fresh());

        // Inside the 60 s safety window counts as stale.
        let nearly_expired = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!nearly_expired.is_fresh());
    }
}
