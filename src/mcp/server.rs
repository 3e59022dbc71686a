//! MCP Server implementation
//!
//! Parses JSON-RPC envelopes, routes them to tools, and serves them over a
//! single-request/single-response HTTP transport.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Result;
use crate::mcp::tools::{QrTool, ToolHandler};
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "qr-generator";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for QR code generation
#[derive(Debug)]
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Bounds concurrently executing tool calls
    permits: Semaphore,

    /// Process start, for health reporting
    started_at: Instant,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let permits = Semaphore::new(config.max_concurrent_requests.max(1));
        let tool_handler = ToolHandler::new(config)?;

        Ok(Self {
            tool_handler,
            permits,
            started_at: Instant::now(),
        })
    }

    /// Seconds since the server was created
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Handle one JSON-RPC request body and produce its response
    pub async fn handle_request(&self, body: impl AsRef<[u8]>) -> JsonRpcResponse {
        let value: Value = match serde_json::from_slice(body.as_ref()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Rejected unparseable request: {}", e);
                return JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error());
            }
        };

        let request = match parse_envelope(value) {
            Ok(req) => req,
            Err(id) => return JsonRpcResponse::error(id, JsonRpcError::invalid_request()),
        };

        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        match request.method.as_str() {
            methods::INITIALIZE => to_value(self.handle_initialize()),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => to_value(ListToolsResult {
                tools: self.tool_handler.list_tools(),
            }),
            methods::CALL_TOOL => self.handle_call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        }
    }

    /// Handle call tool request
    async fn handle_call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tool parameters"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e))
                })
            })?;

        let tool = QrTool::from_name(&params.name)
            .ok_or_else(|| JsonRpcError::tool_not_found(&params.name))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;

        tracing::info!("Calling tool {}", tool.name());
        match self.tool_handler.call_tool(tool, params.arguments).await {
            Ok(result) => to_value(result),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", tool.name(), e);
                Err(JsonRpcError::tool_error(e.to_string()))
            }
        }
    }

    /// HTTP routes: JSON-RPC over POST, `GET /health`, JSON 404/405 otherwise
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(
                "/health",
                axum::routing::get(health_handler)
                    .post(rpc_handler)
                    .fallback(method_not_allowed),
            )
            .route("/", post(rpc_handler).fallback(method_not_allowed))
            .route("/mcp", post(rpc_handler).fallback(method_not_allowed))
            .fallback(fallback_handler)
            .with_state(self)
    }

    /// Serve HTTP until ctrl-c
    pub async fn run_http(self: Arc<Self>, config: &Config) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
        tracing::info!("MCP Server started on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("MCP Server stopped");
        Ok(())
    }
}

/// Validate the JSON-RPC 2.0 envelope; on failure return the id to echo back
fn parse_envelope(value: Value) -> std::result::Result<JsonRpcRequest, RequestId> {
    let id = value.get("id").map(RequestId::from_value);
    let echo = id.clone().flatten().unwrap_or(RequestId::Null);

    if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(echo);
    }
    let method = match value.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return Err(echo),
    };
    let id = match id {
        Some(Some(id)) => id,
        _ => return Err(echo),
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params: value.get("params").cloned(),
    })
}

fn to_value<T: serde::Serialize>(value: T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

async fn rpc_handler(State(server): State<Arc<McpServer>>, body: Bytes) -> Json<JsonRpcResponse> {
    Json(server.handle_request(&body).await)
}

async fn health_handler(State(server): State<Arc<McpServer>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": SERVER_VERSION,
        "uptime": server.uptime_secs(),
    }))
}

async fn fallback_handler(State(server): State<Arc<McpServer>>, method: Method, body: Bytes) -> Response {
    if method == Method::POST {
        return rpc_handler(State(server), body).await.into_response();
    }
    transport_error(StatusCode::NOT_FOUND, "Not found")
}

async fn method_not_allowed() -> Response {
    transport_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn transport_error(status: StatusCode, message: &str) -> Response {
    let body = JsonRpcResponse::error(RequestId::Null, JsonRpcError::transport(message));
    (status, Json(body)).into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> McpServer {
        McpServer::new(Arc::new(Config::default())).unwrap()
    }

    #[test]
    fn test_server_info() {
        assert_eq!(SERVER_NAME, "qr-generator");
    }

    #[test]
    fn test_envelope_requires_version_method_and_id() {
        assert!(parse_envelope(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).is_ok());
        assert!(parse_envelope(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).is_ok());

        assert_eq!(
            parse_envelope(json!({"jsonrpc": "1.0", "id": 3, "method": "ping"})).unwrap_err(),
            RequestId::Number(3)
        );
        assert!(parse_envelope(json!({"jsonrpc": "2.0", "id": 1})).is_err());
        assert!(parse_envelope(json!({"jsonrpc": "2.0", "method": "ping"})).is_err());
        assert!(parse_envelope(json!({"jsonrpc": "2.0", "id": [1], "method": "ping"})).is_err());
        assert!(parse_envelope(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = server().handle_request("{not json").await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32700);
        assert_eq!(error.message, "Parse error");
        assert_eq!(response.id, RequestId::Null);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = server()
            .handle_request(r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#)
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found: resources/list");
        assert_eq!(response.id, RequestId::String("a".to_string()));
    }

    #[tokio::test]
    async fn test_call_without_params() {
        let response = server()
            .handle_request(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call"}"#)
            .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = server()
            .handle_request(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "qr-generator");
        assert!(result["capabilities"]["tools"].is_object());
    }
}
