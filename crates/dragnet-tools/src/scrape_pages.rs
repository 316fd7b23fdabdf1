//! Batch page-scraping tool over the fallback-ladder adapter.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_providers::scraper::{ScrapeApi, ScrapeResponse};

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, credential_hint, parse_args};

const MIN_URLS: usize = 1;
const MAX_URLS: usize = 50;

#[derive(Deserialize)]
struct ScrapePagesArgs {
    urls: Vec<String>,
}

/// Scrapes a batch of URLs, escalating render modes per URL as needed.
///
/// Concurrency, windowing, and the inter-window pause live in the adapter's
/// batched operation; this handler owns bounds, aggregation, and rendering.
pub struct ScrapePagesTool {
    scrape: Arc<dyn ScrapeApi>,
}

impl ScrapePagesTool {
    /// Create the tool over a scrape adapter.
    #[must_use]
    pub fn new(scrape: Arc<dyn ScrapeApi>) -> Self {
        Self { scrape }
    }
}

#[async_trait]
impl ToolHandler for ScrapePagesTool {
    fn name(&self) -> &'static str {
        "scrape_pages"
    }

    async fn handle(&self, args: Value, _cancel: &CancellationToken) -> HandlerOutput {
        let args: ScrapePagesArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) = check_batch_size("urls", args.urls.len(), MIN_URLS, MAX_URLS) {
            return output;
        }

        let n = args.urls.len();
        let responses = self.scrape.scrape_batch(&args.urls).await;

        let mut succeeded = 0usize;
        let mut not_found = 0usize;
        let mut failed = 0usize;
        let mut credits = 0u32;
        let mut credential_failure = false;

        let mut sections = String::new();
        for response in &responses {
            credits += response.credits_consumed;
            match &response.error {
                None => {
                    if response.status_code == Some(404) {
                        not_found += 1;
                        let _ = writeln!(sections, "## {}\n\nNot found (404).\n", response.url);
                    } else {
                        succeeded += 1;
                        render_page(&mut sections, response);
                    }
                },
                Some(error) => {
                    failed += 1;
                    credential_failure |= error.is_credential_failure();
                    let _ = writeln!(sections, "❌ Failed: {} — {error}\n", response.url);
                },
            }
        }

        info!(urls = n, succeeded, not_found, failed, credits, "scrape batch complete");

        let mut body = String::from("# Scraped Pages\n\n");
        let _ = writeln!(
            body,
            "**URLs:** {n} | **Succeeded:** {succeeded} | **Not found:** {not_found} | **Failed:** {failed}"
        );
        let _ = writeln!(body, "**Credits consumed:** {credits}\n");
        if credential_failure {
            let _ = writeln!(body, "{}\n", credential_hint("SCRAPER_API_KEY"));
        }
        body.push_str(&sections);

        let metadata = serde_json::json!({
            "tool": self.name(),
            "urls": n,
            "succeeded": succeeded,
            "not_found": not_found,
            "failed": failed,
            "credits_consumed": credits,
        });

        if succeeded + not_found == 0 {
            let error = ProviderError::new(ErrorKind::Internal, "every scrape failed");
            let mut output = HandlerOutput::failure_with_hint(
                "Scraping failed",
                &error,
                credential_failure
                    .then(|| credential_hint("SCRAPER_API_KEY"))
                    .as_deref(),
            );
            output.body.push('\n');
            output.body.push_str(&sections);
            output.metadata = metadata;
            return output;
        }

        HandlerOutput::success(body, metadata)
    }
}

fn render_page(out: &mut String, response: &ScrapeResponse) {
    let _ = writeln!(out, "## {}\n", response.url);
    let _ = writeln!(
        out,
        "mode: {:?}, status: {}, {} chars",
        response.mode,
        response.status_code.map_or_else(|| "-".to_string(), |s| s.to_string()),
        response.content.chars().count()
    );
    if !response.content.is_empty() {
        let preview: String = response.content.chars().take(500).collect();
        let _ = writeln!(out, "\n```\n{preview}\n```");
    }
    out.push('\n');
}
