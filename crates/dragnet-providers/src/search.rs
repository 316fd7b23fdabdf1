//! Batched web-search adapter (Serper-style proxy).
//!
//! One HTTP POST carries the whole batch: the payload is a JSON array with
//! one entry per query, and the response maps back position-wise. A
//! sub-response that fails to parse yields an empty outcome at its position
//! rather than failing the batch. The Reddit-scoped operation appends a
//! `site:reddit.com` domain filter and an optional date filter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dragnet_core::error::ProviderResult;

use crate::http::{DEFAULT_TIMEOUT, USER_AGENT, classify_reqwest};

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

/// Results requested per query.
const RESULTS_PER_QUERY: u32 = 10;

/// Date-restriction filter for Reddit-scoped searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    /// Past hour.
    Hour,
    /// Past 24 hours.
    Day,
    /// Past week.
    Week,
    /// Past month.
    Month,
    /// Past year.
    Year,
}

impl TimeFilter {
    /// The provider's `tbs` query-parameter encoding.
    #[must_use]
    pub const fn as_tbs(self) -> &'static str {
        match self {
            Self::Hour => "qdr:h",
            Self::Day => "qdr:d",
            Self::Week => "qdr:w",
            Self::Month => "qdr:m",
            Self::Year => "qdr:y",
        }
    }

    /// Parse a user-supplied filter name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

/// A single organic search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Snippet text, possibly empty.
    pub snippet: String,
    /// 0-indexed position within its query's result list.
    pub position: usize,
}

/// Per-query outcome of a batched search.
///
/// An empty `results` with no `error` is a legal "nothing found" outcome;
/// failure is always explicit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// The query as sent (after any scoping rewrites).
    pub query: String,
    /// Organic results in provider order.
    pub results: Vec<SearchHit>,
    /// Provider-reported total result count.
    pub total_results: u64,
    /// Related queries suggested by the provider.
    pub related_queries: Vec<String>,
    /// Set when this entry's sub-response could not be used.
    pub error: Option<dragnet_core::error::ProviderError>,
}

impl SearchOutcome {
    /// An empty outcome for a query whose sub-response was unusable.
    #[must_use]
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            total_results: 0,
            related_queries: Vec::new(),
            error: None,
        }
    }
}

/// Batched search operations.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Search every query in one batched call, returning one outcome per
    /// query in input order. Empty input returns empty output without a
    /// provider call.
    async fn search_batch(&self, queries: &[String]) -> ProviderResult<Vec<SearchOutcome>>;

    /// Reddit-scoped variant: appends a `site:reddit.com` filter and an
    /// optional date restriction to each query.
    async fn search_reddit_batch(
        &self,
        queries: &[String],
        time_filter: Option<TimeFilter>,
    ) -> ProviderResult<Vec<SearchOutcome>>;
}

/// HTTP client for the search proxy.
pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: std::time::Duration,
}

impl SearchClient {
    /// Create a client for the default endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-call deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue the batched POST and map sub-responses back position-wise.
    async fn run_batch(&self, queries: Vec<String>) -> ProviderResult<Vec<SearchOutcome>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        debug!(batch_size = queries.len(), "issuing batched search");

        // The payload borrows the queries; serialize it into the request
        // before the queries are consumed for the position-wise mapping.
        let request = {
            let payload: Vec<BatchEntry<'_>> = queries
                .iter()
                .map(|q| BatchEntry {
                    q,
                    num: RESULTS_PER_QUERY,
                })
                .collect();
            self.client
                .post(format!("{}/search", self.base_url))
                .header("X-API-KEY", &self.api_key)
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .timeout(self.timeout)
                .json(&payload)
        };

        let response = request.send().await.map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(dragnet_core::error::ProviderError::from_status(
                status.as_u16(),
                format!("search provider returned {status}: {body}"),
            ));
        }

        let entries: Vec<serde_json::Value> =
            response.json().await.map_err(|e| classify_reqwest(&e))?;

        Ok(queries
            .into_iter()
            .enumerate()
            .map(|(i, query)| match entries.get(i) {
                Some(entry) => parse_entry(query, entry),
                None => {
                    warn!(position = i, "batched response shorter than request");
                    SearchOutcome::empty(query)
                },
            })
            .collect())
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    async fn search_batch(&self, queries: &[String]) -> ProviderResult<Vec<SearchOutcome>> {
        self.run_batch(queries.to_vec()).await
    }

    async fn search_reddit_batch(
        &self,
        queries: &[String],
        time_filter: Option<TimeFilter>,
    ) -> ProviderResult<Vec<SearchOutcome>> {
        let scoped = queries
            .iter()
            .map(|q| scope_to_reddit(q, time_filter))
            .collect();
        self.run_batch(scoped).await
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Rewrite a query with the Reddit domain filter and optional date filter.
fn scope_to_reddit(query: &str, time_filter: Option<TimeFilter>) -> String {
    match time_filter {
        Some(filter) => format!("{query} site:reddit.com tbs={}", filter.as_tbs()),
        None => format!("{query} site:reddit.com"),
    }
}

/// Decode one sub-response; unusable entries become empty outcomes.
fn parse_entry(query: String, entry: &serde_json::Value) -> SearchOutcome {
    let Ok(parsed) = serde_json::from_value::<BatchResponseEntry>(entry.clone()) else {
        warn!(query = %query, "unparseable search sub-response; returning empty entry");
        return SearchOutcome::empty(query);
    };

    let results = parsed
        .organic
        .into_iter()
        .enumerate()
        .map(|(i, hit)| SearchHit {
            title: hit.title,
            url: hit.link,
            snippet: hit.snippet.unwrap_or_default(),
            position: hit.position.map_or(i, |p| p.saturating_sub(1)),
        })
        .collect();

    SearchOutcome {
        query,
        results,
        total_results: parsed
            .search_information
            .and_then(|s| s.total_results)
            .unwrap_or(0),
        related_queries: parsed
            .related_searches
            .into_iter()
            .map(|r| r.query)
            .collect(),
        error: None,
    }
}

// Request/response wire types.

#[derive(Serialize)]
struct BatchEntry<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponseEntry {
    #[serde(default)]
    organic: Vec<OrganicHit>,
    #[serde(default)]
    search_information: Option<SearchInformation>,
    #[serde(default)]
    related_searches: Vec<RelatedSearch>,
}

#[derive(Deserialize)]
struct OrganicHit {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    /// Provider positions are 1-indexed.
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    #[serde(default)]
    total_results: Option<u64>,
}

#[derive(Deserialize)]
struct RelatedSearch {
    query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reddit_scoping_appends_domain_filter() {
        assert_eq!(
            scope_to_reddit("rust async", None),
            "rust async site:reddit.com"
        );
    }

    #[test]
    fn reddit_scoping_appends_date_filter() {
        assert_eq!(
            scope_to_reddit("rust async", Some(TimeFilter::Week)),
            "rust async site:reddit.com tbs=qdr:w"
        );
    }

    #[test]
    fn time_filter_parsing() {
        assert_eq!(TimeFilter::parse("week"), Some(TimeFilter::Week));
        assert_eq!(TimeFilter::parse("YEAR"), Some(TimeFilter::Year));
        assert_eq!(TimeFilter::parse("fortnight"), None);
    }

    #[test]
    fn parse_entry_full_response() {
        let entry = json!({
            "organic": [
                {"title": "A", "link": "https://a.example", "snippet": "first", "position": 1},
                {"title": "B", "link": "https://b.example", "position": 2}
            ],
            "searchInformation": {"totalResults": 12345},
            "relatedSearches": [{"query": "related thing"}]
        });
        let outcome = parse_entry("q".into(), &entry);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].position, 0);
        assert_eq!(outcome.results[1].snippet, "");
        assert_eq!(outcome.total_results, 12345);
        assert_eq!(outcome.related_queries, vec!["related thing"]);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn parse_entry_positions_fall_back_to_index() {
        let entry = json!({
            "organic": [
                {"title": "A", "link": "https://a.example"},
                {"title": "B", "link": "https://b.example"}
            ]
        });
        let outcome = parse_entry("q".into(), &entry);
        assert_eq!(outcome.results[0].position, 0);
        assert_eq!(outcome.results[1].position, 1);
    }

    #[test]
    fn parse_entry_garbage_yields_empty_outcome() {
        let outcome = parse_entry("q".into(), &json!({"organic": "not-an-array"}));
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.total_results, 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        // Unroutable base URL: any HTTP attempt would fail, so an Ok(empty)
        // result proves no call was made.
        let client = SearchClient::new("k").with_base_url("http://127.0.0.1:1");
        let outcomes = client.search_batch(&[]).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
