//! JSON-RPC 2.0 envelope and the MCP tool schemas qpg exposes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol versions this server will negotiate down to during
/// `initialize`. Newest first; the first entry the client also supports
/// is what gets echoed back.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: Option<String>,
    /// Legacy dispatch: some older qpg clients send `{"tool": "...", "params": {...}}`
    /// with no `method` at all instead of a proper `tools/call` envelope.
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

impl JsonRpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(JsonRpcErrorObject { code, message: message.into(), data: None }) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The tool surface this server exposes over `tools/list`/`tools/call`.
/// Kept as a function (not a const) since `serde_json::json!` isn't const.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "qpg_search",
            description: "Hybrid lexical + vector search over an indexed schema's objects",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "source": {"type": "string"},
                    "schema": {"type": "string"},
                    "kind": {"type": "string"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 100},
                    "min_score": {"type": "number", "minimum": -1.0, "maximum": 1.0}
                },
                "required": ["query", "source"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "qpg_deep_search",
            description: "Wider-recall search, always exercising the vector path when available",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "source": {"type": "string"},
                    "schema": {"type": "string"},
                    "kind": {"type": "string"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 100},
                    "min_score": {"type": "number", "minimum": -1.0, "maximum": 1.0}
                },
                "required": ["query", "source"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "qpg_get",
            description: "Fetches full detail for one object by id prefix or fully-qualified name",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string"},
                    "key": {"type": "string"}
                },
                "required": ["source", "key"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "qpg_status",
            description: "Reports the local index location and every registered source's last-indexed status",
            input_schema: serde_json::json!({"type": "object", "properties": {}, "additionalProperties": false}),
        },
        ToolDefinition {
            name: "qpg_list_sources",
            description: "Lists registered Postgres sources",
            input_schema: serde_json::json!({"type": "object", "properties": {}, "additionalProperties": false}),
        },
    ]
}
