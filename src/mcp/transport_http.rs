//! HTTP transport: `POST /mcp` carries one JSON-RPC request/response per
//! call, `GET /health` is a plain liveness probe for the daemon launcher.

use crate::mcp::protocol::handle_request;
use crate::mcp::types::JsonRpcRequest;
use crate::mcp::McpState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn mcp_handler(State(state): State<Arc<McpState>>, Json(req): Json<JsonRpcRequest>) -> Json<Value> {
    let response = handle_request(&state, req).await;
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

pub fn build_router(state: Arc<McpState>) -> Router {
    Router::new().route("/mcp", post(mcp_handler)).route("/health", get(health)).with_state(state)
}

pub async fn serve_http(state: Arc<McpState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mcp http server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
