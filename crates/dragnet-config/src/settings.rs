//! Environment-derived settings and the capability map.
//!
//! Credentials are read once at process start and are read-only
//! thereafter. A capability is enabled iff its credentials are present;
//! a tool gated on a disabled capability never reaches its handler.

use std::collections::BTreeMap;

use tracing::debug;

/// Capability tags, in the order they are reported.
pub const CAPABILITY_TAGS: [&str; 5] = [
    "search",
    "reddit",
    "scraping",
    "deep_research",
    "llm_extraction",
];

/// Credentials and overrides collected from the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// `SEARCH_API_KEY`.
    pub search_api_key: Option<String>,
    /// `REDDIT_CLIENT_ID`.
    pub reddit_client_id: Option<String>,
    /// `REDDIT_CLIENT_SECRET`.
    pub reddit_client_secret: Option<String>,
    /// `SCRAPER_API_KEY`.
    pub scraper_api_key: Option<String>,
    /// `LLM_API_KEY`.
    pub llm_api_key: Option<String>,
    /// `RESEARCH_MODEL` override.
    pub research_model: Option<String>,
    /// `LLM_EXTRACTION_MODEL` override.
    pub extraction_model: Option<String>,
    /// `OPENROUTER_BASE_URL` override.
    pub openrouter_base_url: Option<String>,
}

impl Settings {
    /// Collect settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            search_api_key: env_non_empty("SEARCH_API_KEY"),
            reddit_client_id: env_non_empty("REDDIT_CLIENT_ID"),
            reddit_client_secret: env_non_empty("REDDIT_CLIENT_SECRET"),
            scraper_api_key: env_non_empty("SCRAPER_API_KEY"),
            llm_api_key: env_non_empty("LLM_API_KEY"),
            research_model: env_non_empty("RESEARCH_MODEL"),
            extraction_model: env_non_empty("LLM_EXTRACTION_MODEL"),
            openrouter_base_url: env_non_empty("OPENROUTER_BASE_URL"),
        }
    }

    /// Compute the process-wide capability map.
    #[must_use]
    pub fn capabilities(&self) -> CapabilityMap {
        let llm = self.llm_api_key.is_some();
        let mut map = BTreeMap::new();
        map.insert("search".to_string(), self.search_api_key.is_some());
        map.insert(
            "reddit".to_string(),
            self.reddit_client_id.is_some() && self.reddit_client_secret.is_some(),
        );
        map.insert("scraping".to_string(), self.scraper_api_key.is_some());
        map.insert("deep_research".to_string(), llm);
        map.insert("llm_extraction".to_string(), llm);

        for (tag, enabled) in &map {
            debug!(capability = %tag, enabled, "capability computed");
        }
        CapabilityMap { map }
    }
}

/// Process-wide immutable capability flags.
#[derive(Debug, Clone)]
pub struct CapabilityMap {
    map: BTreeMap<String, bool>,
}

impl CapabilityMap {
    /// A map with every capability enabled (tests and trusted setups).
    #[must_use]
    pub fn all_enabled() -> Self {
        Self {
            map: CAPABILITY_TAGS
                .iter()
                .map(|tag| ((*tag).to_string(), true))
                .collect(),
        }
    }

    /// A map with every capability disabled.
    #[must_use]
    pub fn all_disabled() -> Self {
        Self {
            map: CAPABILITY_TAGS
                .iter()
                .map(|tag| ((*tag).to_string(), false))
                .collect(),
        }
    }

    /// Whether a capability is enabled. Unknown tags are disabled.
    #[must_use]
    pub fn is_enabled(&self, tag: &str) -> bool {
        self.map.get(tag).copied().unwrap_or(false)
    }

    /// The environment variables a disabled capability is missing.
    #[must_use]
    pub fn missing_env(tag: &str) -> &'static str {
        match tag {
            "search" => "SEARCH_API_KEY",
            "reddit" => "REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET",
            "scraping" => "SCRAPER_API_KEY",
            "deep_research" | "llm_extraction" => "LLM_API_KEY",
            _ => "an unknown credential",
        }
    }

    /// Enabled capability tags, for startup logging.
    #[must_use]
    pub fn enabled_tags(&self) -> Vec<&str> {
        self.map
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(tag, _)| tag.as_str())
            .collect()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
