//! Dragnet Providers - Thin adapters over the external research services.
//!
//! One adapter per provider, each behind an object-safe async trait so the
//! tool handlers can be driven against stubs:
//! - [`SearchApi`] / [`SearchClient`]: batched web search with a
//!   Reddit-scoped variant
//! - [`RedditApi`] / [`RedditClient`]: OAuth'd post + comment-tree fetching
//!   with a single-flight token cache
//! - [`ScrapeApi`] / [`ScrapeClient`]: three-mode fallback ladder and
//!   windowed batch scraping
//! - [`CompletionApi`] / [`LlmClient`]: chat-completion content extraction
//!   with graceful degradation
//!
//! Adapters own request construction, response parsing, and their
//! provider's status-code semantics. Scheduling and retry live in
//! `dragnet-core`; the only retry an adapter performs itself is the
//! LLM client's provider-tuned policy.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod http;
pub mod llm;
pub mod reddit;
pub mod scraper;
pub mod search;

pub use llm::{CompletionApi, ExtractionRequest, ExtractionResponse, LlmClient};
pub use reddit::{PostMetadata, RedditApi, RedditClient, RedditComment, RedditPost};
pub use scraper::{ScrapeApi, ScrapeClient, ScrapeMode, ScrapeResponse};
pub use search::{SearchApi, SearchClient, SearchHit, SearchOutcome, TimeFilter};
