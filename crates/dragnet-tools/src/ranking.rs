//! Click-through-weighted URL ranking across aggregated search queries.
//!
//! Each appearance of a URL contributes `w(position)` to its score, where
//! `w` is a monotonically decreasing function of the 0-indexed result
//! position. URLs that showed up in enough distinct queries form the
//! "consensus" group; everything ranks in "all". Ties break by the minimum
//! position seen across queries, then by URL lexicographic order.

use std::collections::HashMap;

use serde::Serialize;

use dragnet_providers::search::SearchOutcome;

/// Position-weighting function.
pub type PositionWeight = fn(usize) -> f64;

/// The default weight: `1 / (1 + pos)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reciprocal_weight(position: usize) -> f64 {
    1.0 / (1.0 + position as f64)
}

/// Aggregation parameters.
#[derive(Clone, Copy)]
pub struct RankingConfig {
    /// A URL must appear in at least this many distinct queries to count
    /// as consensus.
    pub consensus_threshold: usize,
    /// Weight of an appearance at a given 0-indexed position.
    pub position_weight: PositionWeight,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 2,
            position_weight: reciprocal_weight,
        }
    }
}

impl std::fmt::Debug for RankingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingConfig")
            .field("consensus_threshold", &self.consensus_threshold)
            .finish_non_exhaustive()
    }
}

/// One ranked URL.
#[derive(Debug, Clone, Serialize)]
pub struct RankedUrl {
    /// The URL.
    pub url: String,
    /// Title from its first appearance.
    pub title: String,
    /// CTR-weighted score.
    pub score: f64,
    /// Total appearances across all queries.
    pub appearances: usize,
    /// Distinct queries the URL appeared in.
    pub query_count: usize,
    /// Best (minimum) 0-indexed position seen.
    pub best_position: usize,
}

/// Ranked output: the consensus group and the full ranking.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RankedResults {
    /// URLs that appeared in at least the threshold number of queries.
    pub consensus: Vec<RankedUrl>,
    /// Every URL, ranked.
    pub all: Vec<RankedUrl>,
}

/// Aggregate per-query outcomes into a cross-query ranking.
///
/// The per-query raw lists are untouched; callers keep them verbatim.
#[must_use]
pub fn rank_urls(outcomes: &[SearchOutcome], config: &RankingConfig) -> RankedResults {
    struct Entry {
        title: String,
        score: f64,
        appearances: usize,
        queries: Vec<usize>,
        best_position: usize,
    }

    let mut by_url: HashMap<&str, Entry> = HashMap::new();

    for (query_index, outcome) in outcomes.iter().enumerate() {
        for hit in &outcome.results {
            let entry = by_url.entry(hit.url.as_str()).or_insert_with(|| Entry {
                title: hit.title.clone(),
                score: 0.0,
                appearances: 0,
                queries: Vec::new(),
                best_position: hit.position,
            });
            entry.score += (config.position_weight)(hit.position);
            entry.appearances += 1;
            entry.best_position = entry.best_position.min(hit.position);
            if entry.queries.last() != Some(&query_index) {
                entry.queries.push(query_index);
            }
        }
    }

    let mut all: Vec<RankedUrl> = by_url
        .into_iter()
        .map(|(url, entry)| RankedUrl {
            url: url.to_string(),
            title: entry.title,
            score: entry.score,
            appearances: entry.appearances,
            query_count: entry.queries.len(),
            best_position: entry.best_position,
        })
        .collect();

    all.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_position.cmp(&b.best_position))
            .then_with(|| a.url.cmp(&b.url))
    });

    let consensus = all
        .iter()
        .filter(|r| r.query_count >= config.consensus_threshold)
        .cloned()
        .collect();

    RankedResults { consensus, all }
}
