//! Dragnet Tools - The per-tool handler pipelines.
//!
//! Every handler follows the same shape: bounds-check the batch, compute a
//! budget allocation, build one task per input, run the tasks through the
//! bounded executor with the tool's concurrency cap, aggregate ordered
//! results, and format a Markdown body plus a metadata record that mirrors
//! the body's counters.
//!
//! Handlers never propagate a failure out-of-band: every path ends in a
//! [`HandlerOutput`], and error state travels as a structured flag that the
//! formatter renders as a sentinel prefix.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod deep_research;
pub mod extract_content;
pub mod handler;
pub mod ranking;
pub mod reddit_posts;
pub mod reddit_search;
pub mod scrape_pages;
pub mod web_search;

pub use deep_research::DeepResearchTool;
pub use extract_content::ExtractContentTool;
pub use handler::{ERROR_SENTINEL, HandlerOutput, ToolHandler};
pub use ranking::{RankedResults, RankedUrl, RankingConfig, reciprocal_weight};
pub use reddit_posts::RedditPostsTool;
pub use reddit_search::RedditSearchTool;
pub use scrape_pages::ScrapePagesTool;
pub use web_search::WebSearchTool;
