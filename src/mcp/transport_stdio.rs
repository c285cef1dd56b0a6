//! Line-delimited JSON-RPC over stdio: one request per line on stdin, one
//! response per line on stdout. Malformed input gets a proper JSON-RPC
//! error object back (`-32700` unparseable, `-32600` parseable-but-not-a-
//! request) instead of being silently dropped, so a misbehaving client
//! sees why nothing came back.

use crate::mcp::protocol::{handle_request, invalid_request_response, parse_error_response};
use crate::mcp::types::JsonRpcRequest;
use crate::mcp::McpState;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn serve_stdio(state: &McpState) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Err(e) => parse_error_response(format!("invalid JSON: {e}")),
            Ok(value) => match serde_json::from_value::<JsonRpcRequest>(value) {
                Ok(req) => handle_request(state, req).await,
                Err(e) => invalid_request_response(Value::Null, format!("not a valid request: {e}")),
            },
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_line_is_detected_before_dispatch() {
        let result = serde_json::from_str::<Value>("{not json");
        assert!(result.is_err());
    }
}
