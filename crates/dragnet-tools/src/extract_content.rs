//! Content-extraction tool: scrape each URL, then run the caller's
//! extraction prompt over it.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_core::fanout::FanoutExecutor;
use dragnet_providers::llm::{CompletionApi, ExtractionRequest};
use dragnet_providers::scraper::ScrapeApi;

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, parse_args};

const MIN_URLS: usize = 1;
const MAX_URLS: usize = 10;

/// Modest fan-out: every URL costs a scrape plus a completion.
const FANOUT_CAP: usize = 3;

/// Output-token ceiling per extracted page.
const MAX_TOKENS_PER_PAGE: u32 = 4096;

#[derive(Deserialize)]
struct ExtractContentArgs {
    urls: Vec<String>,
    prompt: String,
}

struct PageExtraction {
    url: String,
    outcome: Result<String, ProviderError>,
    processed: bool,
    fallback_excerpt: Option<String>,
    tokens_used: Option<u32>,
}

/// Scrape-then-extract over a small batch of URLs.
pub struct ExtractContentTool {
    scrape: Arc<dyn ScrapeApi>,
    llm: Arc<dyn CompletionApi>,
}

impl ExtractContentTool {
    /// Create the tool over the scrape and completion adapters.
    #[must_use]
    pub fn new(scrape: Arc<dyn ScrapeApi>, llm: Arc<dyn CompletionApi>) -> Self {
        Self { scrape, llm }
    }

    async fn extract_one(
        &self,
        url: String,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> PageExtraction {
        // The fallback ladder fully owns mode escalation and termination;
        // one call per URL, its final outcome is final.
        let page = self.scrape.scrape_with_fallback(&url).await;
        if let Some(error) = page.error {
            return PageExtraction {
                url,
                outcome: Err(error),
                processed: false,
                fallback_excerpt: None,
                tokens_used: None,
            };
        }

        if page.content.is_empty() {
            return PageExtraction {
                url,
                outcome: Err(ProviderError::new(
                    ErrorKind::NotFound,
                    "page had no content to extract",
                )),
                processed: false,
                fallback_excerpt: None,
                tokens_used: None,
            };
        }

        let extraction = self
            .llm
            .extract(
                ExtractionRequest {
                    content: page.content,
                    prompt: prompt.to_string(),
                    max_tokens: MAX_TOKENS_PER_PAGE,
                },
                cancel,
            )
            .await;

        if extraction.processed {
            PageExtraction {
                url,
                outcome: Ok(extraction.content),
                processed: true,
                fallback_excerpt: None,
                tokens_used: extraction.tokens_used,
            }
        } else {
            // The adapter hands back the raw page; keep an excerpt so the
            // caller still gets something usable.
            let excerpt: String = extraction.content.chars().take(500).collect();
            PageExtraction {
                url,
                outcome: Err(extraction.error.unwrap_or_else(|| {
                    ProviderError::new(ErrorKind::Internal, "extraction failed without detail")
                })),
                processed: false,
                fallback_excerpt: Some(excerpt),
                tokens_used: None,
            }
        }
    }
}

#[async_trait]
impl ToolHandler for ExtractContentTool {
    fn name(&self) -> &'static str {
        "extract_content"
    }

    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput {
        let args: ExtractContentArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) = check_batch_size("urls", args.urls.len(), MIN_URLS, MAX_URLS) {
            return output;
        }
        if args.prompt.trim().is_empty() {
            let error = ProviderError::new(ErrorKind::InvalidInput, "prompt must not be empty");
            return HandlerOutput::failure("Invalid request", &error);
        }

        let n = args.urls.len();
        let prompt = args.prompt;
        let executor = FanoutExecutor::new(FANOUT_CAP);
        let results = executor
            .run(args.urls, |_, url| {
                let prompt = &prompt;
                async move { Ok(self.extract_one(url, prompt, cancel).await) }
            })
            .await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut unprocessed = 0usize;
        let mut tokens_used = 0u64;

        let mut sections = String::new();
        for result in &results {
            match result {
                Ok(page) => {
                    tokens_used += u64::from(page.tokens_used.unwrap_or(0));
                    match &page.outcome {
                        Ok(extracted) => {
                            succeeded += 1;
                            let _ = writeln!(sections, "## {}\n\n{extracted}\n", page.url);
                        },
                        Err(error) => {
                            failed += 1;
                            if !page.processed && page.fallback_excerpt.is_some() {
                                unprocessed += 1;
                            }
                            let _ = writeln!(sections, "## {}\n\n❌ Failed: {error}\n", page.url);
                            if let Some(excerpt) = &page.fallback_excerpt {
                                let _ = writeln!(
                                    sections,
                                    "Raw page excerpt (not processed):\n\n> {excerpt}\n"
                                );
                            }
                        },
                    }
                },
                Err(error) => {
                    failed += 1;
                    let _ = writeln!(sections, "❌ Failed: {error}\n");
                },
            }
        }

        info!(urls = n, succeeded, failed, "extraction complete");

        let mut body = String::from("# Extracted Content\n\n");
        let _ = writeln!(
            body,
            "**URLs:** {n} | **Succeeded:** {succeeded} | **Failed:** {failed} | **Tokens used:** {tokens_used}\n"
        );
        body.push_str(&sections);

        let metadata = serde_json::json!({
            "tool": self.name(),
            "urls": n,
            "succeeded": succeeded,
            "failed": failed,
            "unprocessed": unprocessed,
            "tokens_used": tokens_used,
        });

        if succeeded == 0 {
            let error = ProviderError::new(ErrorKind::Internal, "every extraction failed");
            let mut output = HandlerOutput::failure("Extraction failed", &error);
            output.body.push('\n');
            output.body.push_str(&sections);
            output.metadata = metadata;
            return output;
        }

        HandlerOutput::success(body, metadata)
    }
}
