//! Stdio tool server.
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout and exposes the four
//! query operations as tools. Logs go to stderr so stdout stays protocol-only.

use crate::query::{error_payload, QueryService};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "flowprobe";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(-32700, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }
}

/// Tool descriptors advertised by `tools/list`.
pub fn tool_definitions() -> Value {
    let session_id = json!({
        "type": "string",
        "description": "Capture file name in the capture directory, with or without extension"
    });

    json!([
        {
            "name": "list_flows",
            "description": "List all HTTP flows in a capture session with index, method, URL and status.",
            "inputSchema": {
                "type": "object",
                "properties": { "session_id": session_id },
                "required": ["session_id"]
            }
        },
        {
            "name": "get_flow_details",
            "description": "Get headers and bodies for specific flows. Large JSON bodies are replaced by a structure preview.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "flow_indexes": {
                        "type": "array",
                        "items": { "type": "integer" },
                        "description": "Flow indexes to retrieve"
                    },
                    "include_content": {
                        "type": "boolean",
                        "description": "Include request and response bodies",
                        "default": true
                    }
                },
                "required": ["session_id", "flow_indexes"]
            }
        },
        {
            "name": "extract_json_fields",
            "description": "Extract values from a flow's JSON body with paths such as $.data.items[0].id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "flow_index": { "type": "integer" },
                    "content_type": {
                        "type": "string",
                        "enum": ["request", "response"],
                        "description": "Which body to read"
                    },
                    "json_paths": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["session_id", "flow_index", "content_type", "json_paths"]
            }
        },
        {
            "name": "analyze_protection",
            "description": "Detect bot protection vendors, challenge pages, protection cookies and suspicious scripts in a flow.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "flow_index": { "type": "integer" },
                    "extract_scripts": {
                        "type": "boolean",
                        "description": "Extract and analyze scripts from HTML responses",
                        "default": true
                    }
                },
                "required": ["session_id", "flow_index"]
            }
        }
    ])
}

pub struct ToolServer {
    service: Arc<QueryService>,
}

impl ToolServer {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    /// Handle one request. Notifications (no id) never get a response.
    pub fn handle_request(&self, request: RpcRequest) -> Option<RpcResponse> {
        debug!("Handling {}", request.method);

        if request.id.is_none() {
            debug!("Notification {} acknowledged", request.method);
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => RpcResponse::success(
                request.id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                }),
            ),
            "ping" => RpcResponse::success(request.id, json!({})),
            "tools/list" => RpcResponse::success(request.id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_tools_call(request),
            _ => RpcResponse::error(request.id, RpcError::method_not_found(&request.method)),
        };
        Some(response)
    }

    fn handle_tools_call(&self, request: RpcRequest) -> RpcResponse {
        let Some(params) = &request.params else {
            return RpcResponse::error(request.id, RpcError::invalid_params("Missing params"));
        };
        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::error(request.id, RpcError::invalid_params("Missing tool name"));
        };

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let (payload, is_error) = match self.service.try_call(tool_name, &arguments) {
            Ok(payload) => (payload, false),
            Err(e) => {
                debug!("{} failed: {}", tool_name, e);
                (error_payload(&e), true)
            }
        };

        let text = match serde_json::to_string_pretty(&payload) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} result: {}", tool_name, e);
                return RpcResponse::error(request.id, RpcError::new(-32603, e.to_string()));
            }
        };

        RpcResponse::success(
            request.id.clone(),
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }

    /// Handle one raw line; `None` when nothing should be written back.
    pub fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                error!("Parse error: {}", e);
                Some(RpcResponse::error(None, RpcError::parse_error(e.to_string())))
            }
        }
    }

    /// Serve requests from stdin until it closes.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        info!(
            "Serving {} tools on stdio (captures in {})",
            SERVER_NAME,
            self.service.store().capture_dir().display()
        );

        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            // Capture parsing is blocking file I/O
            let server = Arc::clone(&self);
            let response = tokio::task::spawn_blocking(move || server.handle_line(&line)).await?;

            if let Some(response) = response {
                let encoded = serde_json::to_string(&response)?;
                stdout.write_all(encoded.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        info!("stdin closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySettings;
    use crate::store::FlowStore;
    use std::fs;
    use tempfile::TempDir;

    fn server() -> (TempDir, ToolServer) {
        let dir = TempDir::new().unwrap();
        let har = json!({"log": {"entries": [{
            "request": {"method": "GET", "url": "https://a.test/", "headers": []},
            "response": {"status": 200, "headers": [], "content": {"text": "ok"}}
        }]}});
        fs::write(dir.path().join("capture.har"), har.to_string()).unwrap();

        let store = Arc::new(FlowStore::new(dir.path()));
        let service = QueryService::new(store, QuerySettings::default());
        (dir, ToolServer::new(Arc::new(service)))
    }

    fn request(id: i64, method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(id)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[test]
    fn test_initialize_and_list() {
        let (_dir, server) = server();

        let init = server.handle_request(request(1, "initialize", json!({}))).unwrap();
        assert_eq!(init.result.unwrap()["serverInfo"]["name"], "flowprobe");

        let tools = server.handle_request(request(2, "tools/list", json!({}))).unwrap();
        let names: Vec<String> = tools.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["list_flows", "get_flow_details", "extract_json_fields", "analyze_protection"]
        );
    }

    #[test]
    fn test_tools_call_success_and_error() {
        let (_dir, server) = server();

        let ok = server
            .handle_request(request(
                3,
                "tools/call",
                json!({"name": "list_flows", "arguments": {"session_id": "capture"}}),
            ))
            .unwrap();
        let result = ok.result.unwrap();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        let flows: Value = serde_json::from_str(text).unwrap();
        assert_eq!(flows[0]["url"], "https://a.test/");

        let failed = server
            .handle_request(request(
                4,
                "tools/call",
                json!({"name": "get_flow_details", "arguments": {"session_id": "capture"}}),
            ))
            .unwrap();
        let result = failed.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("Missing flow_indexes"));
    }

    #[test]
    fn test_protocol_errors() {
        let (_dir, server) = server();

        let unknown = server.handle_request(request(5, "resources/list", json!({}))).unwrap();
        assert_eq!(unknown.error.unwrap().code, -32601);

        let no_name = server.handle_request(request(6, "tools/call", json!({}))).unwrap();
        assert_eq!(no_name.error.unwrap().code, -32602);

        let garbage = server.handle_line("{not json").unwrap();
        assert_eq!(garbage.error.unwrap().code, -32700);
        assert!(garbage.id.is_none());
    }

    #[test]
    fn test_notifications_get_no_response() {
        let (_dir, server) = server();
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(server.handle_line(line).is_none());
    }
}
