//! Tool-definition file loading.
//!
//! The default definitions are embedded in the binary; `--tools <path>`
//! swaps in an external file with the same format. Parsing an unknown
//! parameter type is fatal (the tagged schema enum rejects it); unknown
//! keys are ignored by serde's default behavior.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::PropertySchema;

/// Embedded default tool definitions.
const DEFAULT_TOOLS_TOML: &str = include_str!("tools.toml");

/// One tool entry from the definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolEntry {
    /// Unique tool name.
    pub name: String,
    /// Capability tag gating this tool, if any.
    #[serde(default)]
    pub capability: Option<String>,
    /// Human-readable description.
    pub description: String,
    /// Inline parameter schema.
    #[serde(default)]
    pub params: Option<BTreeMap<String, PropertySchema>>,
    /// Reference to a named schema registered in the binary. Mutually
    /// exclusive with `params`.
    #[serde(default)]
    pub schema: Option<String>,
}

/// The whole definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsFile {
    /// Tool entries, in file order.
    pub tools: Vec<ToolEntry>,
}

impl ToolsFile {
    /// Load the embedded default definitions.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the embedded file is malformed (a
    /// build-time defect) or fails structural checks.
    pub fn load_default() -> ConfigResult<Self> {
        Self::parse(DEFAULT_TOOLS_TOML, "<embedded tools.toml>")
    }

    /// Load definitions from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unreadable, malformed, or
    /// structurally invalid files.
    pub fn load_path(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file = Self::parse(&raw, &path.display().to_string())?;
        info!(path = %path.display(), tools = file.tools.len(), "loaded tool definitions");
        Ok(file)
    }

    fn parse(raw: &str, origin: &str) -> ConfigResult<Self> {
        let file: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        file.check()?;
        Ok(file)
    }

    /// Structural checks beyond what serde enforces: unique non-empty
    /// names, exactly one schema source per tool, and compilable schema
    /// constraints.
    fn check(&self) -> ConfigResult<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.tools {
            if entry.name.is_empty() {
                return Err(ConfigError::InvalidTool {
                    tool: "<unnamed>".to_string(),
                    message: "tool name must not be empty".to_string(),
                });
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateTool(entry.name.clone()));
            }
            match (&entry.params, &entry.schema) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::InvalidTool {
                        tool: entry.name.clone(),
                        message: "params and schema reference are mutually exclusive".to_string(),
                    });
                },
                (None, None) => {
                    return Err(ConfigError::InvalidTool {
                        tool: entry.name.clone(),
                        message: "a tool needs either params or a schema reference".to_string(),
                    });
                },
                _ => {},
            }
            if let Some(params) = &entry.params {
                for (name, property) in params {
                    property.schema.check().map_err(|message| {
                        ConfigError::InvalidTool {
                            tool: entry.name.clone(),
                            message: format!("parameter {name}: {message}"),
                        }
                    })?;
                }
            }
        }
        Ok(())
    }
}
