//! Request dispatch: `initialize`, `tools/list`, `tools/call` over proper
//! JSON-RPC, plus a legacy `{"tool": ..., "params": ...}` envelope some
//! older qpg clients still send with no `method` field at all.
//!
//! A tool that fails during `tools/call` is reported as `isError: true`
//! inside the JSON-RPC *result*, not as a JSON-RPC error object — per the
//! MCP spec, the call was dispatched successfully even if the tool itself
//! failed, so the transport-level envelope stays a success.

use crate::get::get_object;
use crate::mcp::types::{
    tool_definitions, JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::McpState;
use crate::query::{deep_search, run_query, QueryOptions};
use crate::sources::list_sources;
use serde_json::{json, Value};

fn request_id(req: &JsonRpcRequest) -> Value {
    req.id.clone().unwrap_or(Value::Null)
}

pub async fn handle_request(state: &McpState, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = request_id(&req);

    if let Some(tool) = &req.tool {
        return match call_tool(state, tool, &req.params).await {
            Ok(content) => JsonRpcResponse::ok(id, tool_result(content, false)),
            Err(err) => JsonRpcResponse::ok(id, tool_result(json!({"error": err.to_string()}), true)),
        };
    }

    let Some(method) = &req.method else {
        return JsonRpcResponse::err(id, INVALID_PARAMS, "request has neither 'method' nor 'tool'");
    };

    match method.as_str() {
        "initialize" => JsonRpcResponse::ok(id, handle_initialize(&req.params)),
        "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tools_call(state, id, &req.params).await,
        "ping" => JsonRpcResponse::ok(id, json!({})),
        other => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
    }
}

fn handle_initialize(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let negotiated = match requested {
        Some(v) if !v.is_empty() => v,
        _ => SUPPORTED_PROTOCOL_VERSIONS[0],
    };

    json!({
        "protocolVersion": negotiated,
        "serverInfo": { "name": "qpg", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": { "listChanged": false } },
        "instructions": "qpg exposes read-only schema search and retrieval tools over an indexed snapshot; it does not execute arbitrary SQL or mutate the source databases."
    })
}

fn tool_result(content: Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": content.to_string() }],
        "isError": is_error,
    })
}

async fn handle_tools_call(state: &McpState, id: Value, params: &Value) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::err(id, INVALID_PARAMS, "tools/call requires a string 'name'");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    match call_tool(state, name, &arguments).await {
        Ok(content) => JsonRpcResponse::ok(id, tool_result(content, false)),
        Err(err) => JsonRpcResponse::ok(id, tool_result(json!({"error": err.to_string()}), true)),
    }
}

async fn call_tool(state: &McpState, name: &str, params: &Value) -> Result<Value, anyhow::Error> {
    match name {
        "qpg_search" => {
            let opts = parse_query_options(params)?;
            let rows = run_query(&state.pool, state.embedder.as_deref(), state.hook.as_ref(), state.vec_loaded, &opts).await?;
            Ok(json!({ "results": rows }))
        }
        "qpg_deep_search" => {
            let opts = parse_query_options(params)?;
            let rows = deep_search(&state.pool, state.embedder.as_deref(), state.hook.as_ref(), state.vec_loaded, &opts).await?;
            Ok(json!({ "results": rows }))
        }
        "qpg_get" => {
            let source = params.get("source").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("'source' is required"))?;
            let key = params.get("key").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("'key' is required"))?;
            let object = get_object(&state.pool, source, key).await?;
            Ok(serde_json::to_value(object)?)
        }
        "qpg_status" => {
            let sources = list_sources(&state.pool).await?;
            Ok(json!({ "vec_loaded": state.vec_loaded, "sources": sources }))
        }
        "qpg_list_sources" => {
            let sources = list_sources(&state.pool).await?;
            Ok(json!({ "sources": sources }))
        }
        other => Err(anyhow::anyhow!("unknown tool: {other}")),
    }
}

fn parse_query_options(params: &Value) -> Result<QueryOptions<'_>, anyhow::Error> {
    let text = params.get("query").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("'query' is required"))?;
    let source = params.get("source").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("'source' is required"))?;
    Ok(QueryOptions {
        text,
        limit: params.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize,
        source: Some(source),
        schema: params.get("schema").and_then(Value::as_str),
        kind: params.get("kind").and_then(Value::as_str),
        min_score: params.get("min_score").and_then(Value::as_f64),
    })
}

pub fn parse_error_response(message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0", id: Value::Null, result: None, error: Some(JsonRpcErrorObject { code: crate::mcp::types::PARSE_ERROR, message: message.into(), data: None }) }
}

pub fn invalid_request_response(id: Value, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::err(id, crate::mcp::types::INVALID_REQUEST, message)
}
