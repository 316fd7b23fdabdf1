//! Deep-research tool: search → scrape → extract, per question.
//!
//! Each question gets an even share of a fixed token budget and runs the
//! full provider pipeline independently; one question's failure never
//! affects another's result.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dragnet_core::budget::TokenAllocation;
use dragnet_core::error::{ErrorKind, ProviderError};
use dragnet_core::fanout::FanoutExecutor;
use dragnet_core::retry::{RetryPolicy, run_with_retry};
use dragnet_providers::llm::{CompletionApi, ExtractionRequest};
use dragnet_providers::scraper::ScrapeApi;
use dragnet_providers::search::SearchApi;

use crate::handler::{HandlerOutput, ToolHandler, check_batch_size, parse_args};

const MIN_QUESTIONS: usize = 1;
const MAX_QUESTIONS: usize = 10;

/// Token budget shared across one batch of questions.
const TOKEN_BUDGET: u32 = 32_000;

/// Modest fan-out: each question drives several provider calls of its own.
const FANOUT_CAP: usize = 3;

/// Search results scraped per question.
const SOURCES_PER_QUESTION: usize = 3;

const EXTRACTION_PROMPT: &str = "You are a research assistant. Using only the provided source \
     material, answer the research question concisely and cite which source each claim came \
     from. If the material does not answer the question, say so.";

#[derive(Deserialize)]
struct DeepResearchArgs {
    questions: Vec<String>,
}

struct QuestionResult {
    question: String,
    answer: Result<String, ProviderError>,
    sources: Vec<String>,
    tokens_used: Option<u32>,
    retries: u32,
}

/// Research pipeline over search, scraping, and LLM extraction.
pub struct DeepResearchTool {
    search: Arc<dyn SearchApi>,
    scrape: Arc<dyn ScrapeApi>,
    llm: Arc<dyn CompletionApi>,
    search_policy: RetryPolicy,
}

impl DeepResearchTool {
    /// Create the tool over the three adapters it composes.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchApi>,
        scrape: Arc<dyn ScrapeApi>,
        llm: Arc<dyn CompletionApi>,
    ) -> Self {
        Self {
            search,
            scrape,
            llm,
            search_policy: RetryPolicy::search(),
        }
    }

    /// Override the search retry policy (used by tests).
    #[must_use]
    pub fn with_search_policy(mut self, policy: RetryPolicy) -> Self {
        self.search_policy = policy;
        self
    }

    async fn research_one(
        &self,
        question: String,
        max_tokens: u32,
        cancel: &CancellationToken,
    ) -> QuestionResult {
        // 1. Find sources.
        let search_ref = &self.search;
        let question_ref = &question;
        let search_outcome = run_with_retry(
            |_| async move {
                search_ref
                    .search_batch(std::slice::from_ref(question_ref))
                    .await
                    .and_then(|mut batch| {
                        if batch.is_empty() {
                            Err(ProviderError::new(ErrorKind::Parse, "empty search batch"))
                        } else {
                            Ok(batch.remove(0))
                        }
                    })
            },
            &self.search_policy,
            cancel,
        )
        .await;

        let retries = search_outcome.retries();
        let found = match search_outcome.into_result() {
            Ok(found) => found,
            Err(error) => {
                return QuestionResult {
                    question,
                    answer: Err(error),
                    sources: Vec::new(),
                    tokens_used: None,
                    retries,
                };
            },
        };

        let sources: Vec<String> = found
            .results
            .iter()
            .take(SOURCES_PER_QUESTION)
            .map(|hit| hit.url.clone())
            .collect();

        // 2. Fetch source content; degrade to search snippets when nothing
        //    scrapes cleanly.
        let mut material = String::new();
        if !sources.is_empty() {
            for response in self.scrape.scrape_batch(&sources).await {
                if response.is_success() && !response.content.is_empty() {
                    let _ = writeln!(material, "Source: {}\n{}\n", response.url, response.content);
                }
            }
        }
        if material.is_empty() {
            debug!(question = %question, "no scraped content; falling back to snippets");
            for hit in &found.results {
                let _ = writeln!(material, "Source: {}\n{}\n", hit.url, hit.snippet);
            }
        }
        if material.is_empty() {
            return QuestionResult {
                question,
                answer: Err(ProviderError::new(
                    ErrorKind::NotFound,
                    "no source material found",
                )),
                sources,
                tokens_used: None,
                retries,
            };
        }

        // 3. Extract under this question's token share.
        let extraction = self
            .llm
            .extract(
                ExtractionRequest {
                    content: material,
                    prompt: format!("{EXTRACTION_PROMPT}\n\nResearch question: {question}"),
                    max_tokens,
                },
                cancel,
            )
            .await;

        let answer = if extraction.processed {
            Ok(extraction.content)
        } else {
            Err(extraction.error.unwrap_or_else(|| {
                ProviderError::new(ErrorKind::Internal, "extraction failed without detail")
            }))
        };

        QuestionResult {
            question,
            answer,
            sources,
            tokens_used: extraction.tokens_used,
            retries,
        }
    }
}

#[async_trait]
impl ToolHandler for DeepResearchTool {
    fn name(&self) -> &'static str {
        "deep_research"
    }

    async fn handle(&self, args: Value, cancel: &CancellationToken) -> HandlerOutput {
        let args: DeepResearchArgs = match parse_args(args) {
            Ok(args) => args,
            Err(output) => return output,
        };
        if let Err(output) =
            check_batch_size("questions", args.questions.len(), MIN_QUESTIONS, MAX_QUESTIONS)
        {
            return output;
        }

        let n = args.questions.len();
        let allocation = TokenAllocation::split(TOKEN_BUDGET, n);

        let executor = FanoutExecutor::new(FANOUT_CAP);
        let results = executor
            .run(args.questions, |_, question| async move {
                Ok(self.research_one(question, allocation.per_item, cancel).await)
            })
            .await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut retries = 0u32;
        let mut tokens_used = 0u64;

        let mut sections = String::new();
        for result in &results {
            match result {
                Ok(question) => {
                    retries += question.retries;
                    tokens_used += u64::from(question.tokens_used.unwrap_or(0));
                    match &question.answer {
                        Ok(answer) => {
                            succeeded += 1;
                            let _ = writeln!(sections, "## {}\n\n{answer}\n", question.question);
                            if !question.sources.is_empty() {
                                let _ = writeln!(sections, "Sources: {}\n", question.sources.join(", "));
                            }
                        },
                        Err(error) => {
                            failed += 1;
                            let _ = writeln!(
                                sections,
                                "## {}\n\n❌ Failed: {}\n",
                                question.question, error.message
                            );
                        },
                    }
                },
                Err(error) => {
                    failed += 1;
                    let _ = writeln!(sections, "❌ Failed: {error}\n");
                },
            }
        }

        info!(questions = n, succeeded, failed, retries, tokens_used, "deep research complete");

        let mut body = String::from("# Deep Research\n\n");
        let _ = writeln!(
            body,
            "**Token budget:** {} total, {} per question",
            allocation.total, allocation.per_item
        );
        let _ = writeln!(
            body,
            "**Questions:** {n} | **Succeeded:** {succeeded} | **Failed:** {failed} | **Retries:** {retries} | **Tokens used:** {tokens_used}\n"
        );
        body.push_str(&sections);

        let metadata = serde_json::json!({
            "tool": self.name(),
            "questions": n,
            "allocation": allocation,
            "succeeded": succeeded,
            "failed": failed,
            "retries": retries,
            "tokens_used": tokens_used,
        });

        if succeeded == 0 {
            let error = ProviderError::new(ErrorKind::Internal, "every question failed");
            let mut output = HandlerOutput::failure("Deep research failed", &error);
            output.body.push('\n');
            output.body.push_str(&sections);
            output.metadata = metadata;
            return output;
        }

        HandlerOutput::success(body, metadata)
    }
}
