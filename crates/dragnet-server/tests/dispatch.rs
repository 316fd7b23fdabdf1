//! Dispatcher and serve-loop tests: the no-crash and capability-gating
//! invariants, schema-error rendering, and the protocol surface.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use dragnet_config::schema::{ParamSchema, PropertySchema};
use dragnet_config::settings::CapabilityMap;
use dragnet_server::protocol::{JsonRpcId, JsonRpcRequest};
use dragnet_server::{BufferTransport, McpServer, ResponseShape, ToolDescriptor, ToolRegistry};
use dragnet_tools::handler::{HandlerOutput, ToolHandler};

/// Handler stub that counts invocations and returns a canned output.
struct CountingHandler {
    calls: Arc<AtomicU32>,
    body: String,
    failed: bool,
}

#[async_trait]
impl ToolHandler for CountingHandler {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn handle(&self, _args: Value, _cancel: &CancellationToken) -> HandlerOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        HandlerOutput {
            body: self.body.clone(),
            metadata: json!({"stub": true}),
            failed: self.failed,
        }
    }
}

/// Handler stub that panics, to exercise containment.
struct PanickingHandler;

#[async_trait]
impl ToolHandler for PanickingHandler {
    fn name(&self) -> &'static str {
        "panicker"
    }

    async fn handle(&self, _args: Value, _cancel: &CancellationToken) -> HandlerOutput {
        panic!("handler exploded");
    }
}

fn keyword_params() -> BTreeMap<String, PropertySchema> {
    let mut params = BTreeMap::new();
    params.insert(
        "keywords".to_string(),
        PropertySchema {
            schema: ParamSchema::Array {
                items: Box::new(ParamSchema::String {
                    min_length: Some(1),
                    max_length: Some(200),
                    pattern: None,
                    format: None,
                }),
                min_items: Some(1),
                max_items: Some(20),
            },
            required: true,
            description: None,
        },
    );
    params
}

fn descriptor(
    name: &str,
    capability: Option<&str>,
    handler: Arc<dyn ToolHandler>,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        capability: capability.map(str::to_string),
        description: format!("test tool {name}"),
        params: keyword_params(),
        handler,
        response_shape: Some(ResponseShape::default()),
        post_validate: None,
    }
}

fn registry_with(
    capabilities: CapabilityMap,
    descriptors: Vec<ToolDescriptor>,
) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new(capabilities, CancellationToken::new());
    for d in descriptors {
        registry.register(d);
    }
    Arc::new(registry)
}

#[tokio::test]
async fn unknown_tool_is_the_only_protocol_fault() {
    let registry = registry_with(CapabilityMap::all_enabled(), vec![]);
    let err = registry.execute("nonexistent", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("nonexistent"));
}

#[tokio::test]
async fn capability_gate_blocks_handler() {
    // P7: a disabled capability never reaches the handler.
    let calls = Arc::new(AtomicU32::new(0));
    let handler = Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
        body: "ok".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_disabled(),
        vec![descriptor("gated", Some("search"), handler)],
    );

    let result = registry
        .execute("gated", json!({"keywords": ["a"]}))
        .await
        .unwrap();

    assert!(result.is_error);
    assert!(result.body.contains("missing environment variable"));
    assert!(result.body.contains("SEARCH_API_KEY"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run");
}

#[tokio::test]
async fn schema_issues_render_one_per_line() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler = Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
        body: "ok".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("strict", None, handler)],
    );

    let result = registry
        .execute("strict", json!({"keywords": ["", 7]}))
        .await
        .unwrap();

    assert!(result.is_error);
    assert!(result.body.contains("keywords[0]:"));
    assert!(result.body.contains("keywords[1]:"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn garbage_args_never_crash() {
    // P3: any args value yields a ToolResult.
    let handler = Arc::new(CountingHandler {
        calls: Arc::new(AtomicU32::new(0)),
        body: "ok".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("strict", None, handler)],
    );

    for args in [json!(null), json!(42), json!("string"), json!([1, 2, 3])] {
        let result = registry.execute("strict", args).await.unwrap();
        assert!(result.is_error);
    }
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("boom", None, Arc::new(PanickingHandler))],
    );

    let result = registry
        .execute("boom", json!({"keywords": ["a"]}))
        .await
        .unwrap();

    assert!(result.is_error);
    assert!(result.body.contains("Tool crashed"));
    assert!(result.body.contains("handler exploded"));
}

#[tokio::test]
async fn sentinel_in_body_sets_is_error() {
    // The handler reports failed = false but the body carries the
    // sentinel; the declared response shape flips the flag.
    let handler = Arc::new(CountingHandler {
        calls: Arc::new(AtomicU32::new(0)),
        body: "# ❌ something inside went wrong".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("shaped", None, handler)],
    );

    let result = registry
        .execute("shaped", json!({"keywords": ["a"]}))
        .await
        .unwrap();
    assert!(result.is_error);
}

#[tokio::test]
async fn successful_dispatch_passes_body_through() {
    let handler = Arc::new(CountingHandler {
        calls: Arc::new(AtomicU32::new(0)),
        body: "# Results\n\neverything fine".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("fine", None, handler)],
    );

    let result = registry
        .execute("fine", json!({"keywords": ["a"]}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert!(result.body.contains("everything fine"));
    assert_eq!(result.metadata["stub"], true);
}

#[tokio::test]
async fn post_validate_hook_runs_after_schema() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler = Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
        body: "ok".to_string(),
        failed: false,
    });
    let mut d = descriptor("hooked", None, handler);
    d.post_validate = Some(|args| {
        let n = args["keywords"].as_array().map_or(0, Vec::len);
        if n % 2 == 0 {
            Ok(())
        } else {
            Err("keyword count must be even".to_string())
        }
    });
    let registry = registry_with(CapabilityMap::all_enabled(), vec![d]);

    let odd = registry
        .execute("hooked", json!({"keywords": ["a"]}))
        .await
        .unwrap();
    assert!(odd.is_error);
    assert!(odd.body.contains("must be even"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let even = registry
        .execute("hooked", json!({"keywords": ["a", "b"]}))
        .await
        .unwrap();
    assert!(!even.is_error);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn serve_loop_handles_protocol_flow() {
    let handler = Arc::new(CountingHandler {
        calls: Arc::new(AtomicU32::new(0)),
        body: "# Results\n\ndone".to_string(),
        failed: false,
    });
    let registry = registry_with(
        CapabilityMap::all_enabled(),
        vec![descriptor("probe", None, handler)],
    );
    let server = McpServer::new(registry, CancellationToken::new());

    let (mut transport, line_tx, mut response_rx) = BufferTransport::new();
    let serve = tokio::spawn(async move {
        let server = server;
        server.run(&mut transport).await
    });

    // initialize
    line_tx
        .send(r#"{"jsonrpc":"2.0","method":"initialize","id":1,"params":{}}"#.to_string())
        .await
        .unwrap();
    let init = response_rx.recv().await.unwrap();
    assert_eq!(init.result.as_ref().unwrap()["protocolVersion"], "2024-11-05");

    // A notification gets no response.
    line_tx
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string())
        .await
        .unwrap();

    // tools/list
    line_tx
        .send(r#"{"jsonrpc":"2.0","method":"tools/list","id":2}"#.to_string())
        .await
        .unwrap();
    let list = response_rx.recv().await.unwrap();
    assert_eq!(list.id, JsonRpcId::Number(2));
    assert_eq!(list.result.as_ref().unwrap()["tools"][0]["name"], "probe");

    // tools/call
    line_tx
        .send(
            r#"{"jsonrpc":"2.0","method":"tools/call","id":3,"params":{"name":"probe","arguments":{"keywords":["x"]}}}"#
                .to_string(),
        )
        .await
        .unwrap();
    let call = response_rx.recv().await.unwrap();
    let result = call.result.unwrap();
    assert_eq!(result["isError"], false);
    assert!(result["content"][0]["text"].as_str().unwrap().contains("done"));

    // Malformed line → parse error with null id, loop continues.
    line_tx.send("this is not json".to_string()).await.unwrap();
    let parse_error = response_rx.recv().await.unwrap();
    assert_eq!(parse_error.error.unwrap().code, -32700);

    // Unknown method.
    line_tx
        .send(r#"{"jsonrpc":"2.0","method":"prompts/list","id":4}"#.to_string())
        .await
        .unwrap();
    let unknown = response_rx.recv().await.unwrap();
    assert_eq!(unknown.error.unwrap().code, -32601);

    // Unknown tool is a protocol-level error.
    line_tx
        .send(
            r#"{"jsonrpc":"2.0","method":"tools/call","id":5,"params":{"name":"ghost","arguments":{}}}"#
                .to_string(),
        )
        .await
        .unwrap();
    let ghost = response_rx.recv().await.unwrap();
    assert!(ghost.error.unwrap().message.contains("Unknown tool: ghost"));

    // EOF ends the loop cleanly.
    drop(line_tx);
    serve.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_token_stops_serve_loop() {
    let registry = registry_with(CapabilityMap::all_enabled(), vec![]);
    let shutdown = CancellationToken::new();
    let server = McpServer::new(registry, shutdown.clone());

    let (mut transport, _line_tx, _response_rx) = BufferTransport::new();
    let serve = tokio::spawn(async move {
        let server = server;
        server.run(&mut transport).await
    });

    shutdown.cancel();
    serve.await.unwrap().unwrap();
}

#[tokio::test]
async fn handle_request_ignores_notifications() {
    let registry = registry_with(CapabilityMap::all_enabled(), vec![]);
    let server = McpServer::new(registry, CancellationToken::new());
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: "notifications/cancelled".to_string(),
        params: None,
        id: None,
    };
    assert!(server.handle_request(request).await.is_none());
}
