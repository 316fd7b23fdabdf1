//! The serve loop: transport in, dispatch, transport out.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcId, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, ServerCapabilities, ServerInfo,
    ToolContent, ToolsCapability,
};
use crate::registry::{DispatchError, ToolRegistry};
use crate::transport::{Transport, TransportError};

/// The tool-protocol server.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    shutdown: CancellationToken,
}

impl McpServer {
    /// Create a server over a built registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }

    /// Serve until the transport reaches end-of-stream or shutdown fires.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] only for transport-level I/O failures;
    /// malformed requests are answered in-band and the loop continues.
    pub async fn run<T: Transport>(&self, transport: &mut T) -> Result<(), TransportError> {
        info!(tools = self.registry.len(), "serving tool protocol");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("shutdown requested; closing transport loop");
                    return Ok(());
                },
                incoming = transport.recv() => {
                    match incoming? {
                        None => {
                            info!("transport closed by peer");
                            return Ok(());
                        },
                        Some(raw) => {
                            if let Some(response) = self.handle_raw(&raw).await {
                                transport.send(&response).await?;
                            }
                        },
                    }
                },
            }
        }
    }

    /// Parse and dispatch one raw message. `None` means no response is
    /// owed (a notification).
    pub async fn handle_raw(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "malformed request line");
                Some(JsonRpcResponse::error(
                    JsonRpcId::Null,
                    JsonRpcError::parse_error(format!("invalid JSON: {e}")),
                ))
            },
        }
    }

    /// Dispatch one request. `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "request received");

        let Some(id) = request.id else {
            // Notifications get no response.
            debug!(method = %request.method, "notification ignored");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => {
                warn!(method = %other, "unknown method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(other))
            },
        };
        Some(response)
    }

    fn handle_initialize(&self, id: JsonRpcId) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
        }
    }

    fn handle_tools_list(&self, id: JsonRpcId) -> JsonRpcResponse {
        let result = ListToolsResult {
            tools: self.registry.list(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
        }
    }

    async fn handle_tools_call(&self, id: JsonRpcId, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("missing tools/call params"),
                );
            },
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("invalid tools/call params: {e}")),
                );
            },
        };

        match self.registry.execute(&params.name, params.arguments).await {
            Ok(result) => {
                let call_result = CallToolResult {
                    content: vec![ToolContent::Text { text: result.body }],
                    is_error: Some(result.is_error),
                };
                match serde_json::to_value(call_result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => {
                        JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string()))
                    },
                }
            },
            // Unknown tool is the one protocol-layer fault.
            Err(DispatchError::UnknownTool(name)) => JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Unknown tool: {name}")),
            ),
        }
    }
}
