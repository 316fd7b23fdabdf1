//! The tool table and the dispatch pipeline.
//!
//! `execute` is the single entry point for a tool invocation:
//! lookup → capability gate → schema validation → optional post-validation
//! → handler invocation → response shaping. Every path except an unknown
//! tool name produces a [`ToolResult`]; nothing a handler does can crash
//! the server — even a panic is contained and rendered.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dragnet_config::schema::{PropertySchema, properties_to_json_schema, validate_object};
use dragnet_config::settings::CapabilityMap;
use dragnet_core::error::ProviderError;
use dragnet_tools::handler::{ERROR_SENTINEL, ToolHandler};

use crate::protocol;

/// Post-processing declaration: how to detect an error body.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    /// Substring whose presence marks the body as an error.
    pub error_sentinel: String,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self {
            error_sentinel: ERROR_SENTINEL.to_string(),
        }
    }
}

/// Cross-field check the declarative schema cannot express.
pub type PostValidate = fn(&Value) -> Result<(), String>;

/// One registered tool. Immutable for the process lifetime.
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Capability tag gating this tool, if any.
    pub capability: Option<String>,
    /// Human-readable description.
    pub description: String,
    /// Parameter schema.
    pub params: BTreeMap<String, PropertySchema>,
    /// The handler to dispatch to.
    pub handler: Arc<dyn ToolHandler>,
    /// Error-detection declaration for the rendered body.
    pub response_shape: Option<ResponseShape>,
    /// Optional cross-field validation hook.
    pub post_validate: Option<PostValidate>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// What a tool invocation returns to the transport layer.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Rendered Markdown body.
    pub body: String,
    /// Whether the invocation failed at the tool layer.
    pub is_error: bool,
    /// Structured counters mirroring the body.
    pub metadata: Value,
}

/// The only protocol-layer fault in dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No tool registered under this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// In-memory map from tool name to descriptor, built once at startup.
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
    capabilities: CapabilityMap,
    shutdown: CancellationToken,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(capabilities: CapabilityMap, shutdown: CancellationToken) -> Self {
        Self {
            tools: BTreeMap::new(),
            capabilities,
            shutdown,
        }
    }

    /// Register a descriptor. Last registration wins on a name collision
    /// (the config loader already rejects duplicates).
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The tool table for `tools/list`.
    #[must_use]
    pub fn list(&self) -> Vec<protocol::Tool> {
        self.tools
            .values()
            .map(|descriptor| protocol::Tool {
                name: descriptor.name.clone(),
                description: Some(descriptor.description.clone()),
                input_schema: properties_to_json_schema(&descriptor.params),
            })
            .collect()
    }

    /// Run one tool invocation through the dispatch pipeline.
    ///
    /// # Errors
    ///
    /// Only [`DispatchError::UnknownTool`]; every tool-layer failure comes
    /// back as a [`ToolResult`] with `is_error` set.
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<ToolResult, DispatchError> {
        // 1. Lookup.
        let descriptor = self
            .tools
            .get(tool_name)
            .ok_or_else(|| DispatchError::UnknownTool(tool_name.to_string()))?;

        // 2. Capability gate.
        if let Some(capability) = &descriptor.capability {
            if !self.capabilities.is_enabled(capability) {
                let env = CapabilityMap::missing_env(capability);
                warn!(tool = tool_name, capability = %capability, "capability disabled");
                return Ok(ToolResult {
                    body: format!(
                        "{ERROR_SENTINEL} Tool unavailable\n\nThe `{capability}` capability is \
                         disabled: missing environment variable {env}.\n"
                    ),
                    is_error: true,
                    metadata: serde_json::json!({
                        "error": "capability_disabled",
                        "capability": capability,
                    }),
                });
            }
        }

        // 3. Schema validation.
        if let Err(issues) = validate_object(&descriptor.params, &args) {
            let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
            return Ok(ToolResult {
                body: format!(
                    "{ERROR_SENTINEL} Invalid arguments\n\n{}\n",
                    rendered.join("\n")
                ),
                is_error: true,
                metadata: serde_json::json!({
                    "error": "validation_failed",
                    "issues": rendered,
                }),
            });
        }

        // 4. Optional post-validation.
        if let Some(post_validate) = descriptor.post_validate {
            if let Err(message) = post_validate(&args) {
                return Ok(ToolResult {
                    body: format!("{ERROR_SENTINEL} Invalid arguments\n\n{message}\n"),
                    is_error: true,
                    metadata: serde_json::json!({
                        "error": "validation_failed",
                        "issues": [message],
                    }),
                });
            }
        }

        // 5. Handler invocation. Handlers are written never to fail
        //    out-of-band; a panic that slips through is contained here.
        info!(tool = tool_name, "dispatching tool");
        let invocation = descriptor.handler.handle(args, &self.shutdown);
        let output = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(output) => output,
            Err(payload) => {
                let classified = ProviderError::from_panic(payload.as_ref());
                error!(tool = tool_name, error = %classified, "handler panicked");
                return Ok(ToolResult {
                    body: format!(
                        "{ERROR_SENTINEL} Tool crashed\n\n**{}**: {}\n",
                        classified.kind, classified.message
                    ),
                    is_error: true,
                    metadata: serde_json::json!({
                        "error": "handler_panic",
                        "kind": classified.kind,
                    }),
                });
            },
        };

        // 6. Response shaping: the sentinel in the rendered body marks
        //    errors for descriptors that declare one; the structured flag
        //    counts regardless.
        let sentinel_error = descriptor
            .response_shape
            .as_ref()
            .is_some_and(|shape| output.body.contains(&shape.error_sentinel));
        let is_error = output.failed || sentinel_error;

        Ok(ToolResult {
            body: output.body,
            is_error,
            metadata: output.metadata,
        })
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
