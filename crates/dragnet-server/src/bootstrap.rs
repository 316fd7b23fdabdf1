//! Building the tool registry from settings and the tool-definition file.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dragnet_config::settings::Settings;
use dragnet_config::tools_file::ToolsFile;
use dragnet_providers::llm::LlmClient;
use dragnet_providers::reddit::RedditClient;
use dragnet_providers::scraper::ScrapeClient;
use dragnet_providers::search::SearchClient;
use dragnet_tools::handler::ToolHandler;
use dragnet_tools::{
    DeepResearchTool, ExtractContentTool, RedditPostsTool, RedditSearchTool, ScrapePagesTool,
    WebSearchTool,
};

use crate::registry::{ResponseShape, ToolDescriptor, ToolRegistry};
use crate::schemas::named_schema;

/// Startup-time registry construction failures.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The tool file references a schema the binary does not register.
    #[error("tool {tool} references unknown schema: {schema}")]
    UnknownSchema {
        /// Tool name.
        tool: String,
        /// The dangling reference.
        schema: String,
    },
    /// The tool file names a tool the binary has no handler for.
    #[error("no handler registered for tool: {tool}")]
    UnknownTool {
        /// Tool name.
        tool: String,
    },
}

/// Build the registry: one descriptor per tool-file entry, wired to real
/// provider adapters.
///
/// Adapters are constructed even when their capability is disabled — the
/// capability gate guarantees they are never called in that case, so a
/// placeholder credential is harmless.
///
/// # Errors
///
/// Returns a [`BuildError`] for dangling schema references or tool names
/// without a matching handler; both are startup-fatal.
pub fn build_registry(
    settings: &Settings,
    tools_file: &ToolsFile,
    shutdown: CancellationToken,
) -> Result<ToolRegistry, BuildError> {
    let search: Arc<SearchClient> = Arc::new(SearchClient::new(
        settings.search_api_key.clone().unwrap_or_default(),
    ));
    let reddit: Arc<RedditClient> = Arc::new(RedditClient::new(
        settings.reddit_client_id.clone().unwrap_or_default(),
        settings.reddit_client_secret.clone().unwrap_or_default(),
    ));
    let scrape: Arc<ScrapeClient> = Arc::new(ScrapeClient::new(
        settings.scraper_api_key.clone().unwrap_or_default(),
    ));

    let llm_key = settings.llm_api_key.clone().unwrap_or_default();
    let mut research_llm = LlmClient::new(llm_key.clone());
    if let Some(model) = &settings.research_model {
        research_llm = research_llm.with_model(model.clone());
    }
    let mut extraction_llm = LlmClient::new(llm_key);
    if let Some(model) = &settings.extraction_model {
        extraction_llm = extraction_llm.with_model(model.clone());
    }
    if let Some(base_url) = &settings.openrouter_base_url {
        research_llm = research_llm.with_base_url(base_url.clone());
        extraction_llm = extraction_llm.with_base_url(base_url.clone());
    }
    let research_llm = Arc::new(research_llm);
    let extraction_llm = Arc::new(extraction_llm);

    let capabilities = settings.capabilities();
    let mut registry = ToolRegistry::new(capabilities, shutdown);

    for entry in &tools_file.tools {
        let params = match (&entry.params, &entry.schema) {
            (Some(params), _) => params.clone(),
            (None, Some(reference)) => {
                named_schema(reference).ok_or_else(|| BuildError::UnknownSchema {
                    tool: entry.name.clone(),
                    schema: reference.clone(),
                })?
            },
            // The config loader rejects entries with neither.
            (None, None) => {
                return Err(BuildError::UnknownSchema {
                    tool: entry.name.clone(),
                    schema: "<missing>".to_string(),
                });
            },
        };

        let handler: Arc<dyn ToolHandler> = match entry.name.as_str() {
            "web_search" => Arc::new(WebSearchTool::new(search.clone())),
            "reddit_search" => Arc::new(RedditSearchTool::new(search.clone())),
            "reddit_posts" => Arc::new(RedditPostsTool::new(reddit.clone())),
            "scrape_pages" => Arc::new(ScrapePagesTool::new(scrape.clone())),
            "deep_research" => Arc::new(DeepResearchTool::new(
                search.clone(),
                scrape.clone(),
                research_llm.clone(),
            )),
            "extract_content" => Arc::new(ExtractContentTool::new(
                scrape.clone(),
                extraction_llm.clone(),
            )),
            _ => {
                return Err(BuildError::UnknownTool {
                    tool: entry.name.clone(),
                });
            },
        };

        registry.register(ToolDescriptor {
            name: entry.name.clone(),
            capability: entry.capability.clone(),
            description: entry.description.clone(),
            params,
            handler,
            response_shape: Some(ResponseShape::default()),
            post_validate: None,
        });
    }

    info!(tools = registry.len(), "registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_file_builds() {
        let settings = Settings::default();
        let tools_file = ToolsFile::load_default().unwrap();
        let registry =
            build_registry(&settings, &tools_file, CancellationToken::new()).unwrap();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn dangling_schema_reference_is_fatal() {
        let raw = ToolsFile {
            tools: vec![dragnet_config::tools_file::ToolEntry {
                name: "scrape_pages".to_string(),
                capability: Some("scraping".to_string()),
                description: "x".to_string(),
                params: None,
                schema: Some("no_such_schema".to_string()),
            }],
        };
        let err =
            build_registry(&Settings::default(), &raw, CancellationToken::new()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownSchema { .. }));
    }

    #[test]
    fn unknown_tool_name_is_fatal() {
        let raw = ToolsFile {
            tools: vec![dragnet_config::tools_file::ToolEntry {
                name: "teleport".to_string(),
                capability: None,
                description: "x".to_string(),
                params: Some(std::collections::BTreeMap::new()),
                schema: None,
            }],
        };
        let err =
            build_registry(&Settings::default(), &raw, CancellationToken::new()).unwrap_err();
        assert!(matches!(err, BuildError::UnknownTool { .. }));
    }
}
