//! Line-delimited JSON-RPC server over stdio

use super::protocol::*;
use crate::logging;
use crate::state::AppState;
use crate::tool::Registry;
use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub struct McpServer {
    registry: Registry,
    state: AppState,
}

impl McpServer {
    pub fn new(registry: Registry, state: AppState) -> Self {
        Self { registry, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Handle one request per line, in order, until EOF
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                logging::info("stdin closed, shutting down");
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
    }

    /// Parse and dispatch one line. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(e) => {
                logging::warn(&format!("Unparsable request: {e}"));
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Some(JsonRpcResponse::failure(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {e}"),
                ));
            }
        };

        if request.is_notification() {
            logging::debug(&format!("notification: {}", request.method));
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        Some(match self.dispatch(&request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::failure(id, code, message),
        })
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, (i64, String)> {
        match request.method.as_str() {
            "initialize" => Ok(to_value(self.initialize())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(to_value(ToolsListResult {
                tools: self.registry.definitions(),
            })),
            "tools/call" => {
                let params: ToolCallParams = request
                    .params
                    .clone()
                    .ok_or_else(|| (INVALID_PARAMS, "Missing params".to_string()))
                    .and_then(|p| {
                        serde_json::from_value(p)
                            .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))
                    })?;
                Ok(to_value(self.call_tool(params).await))
            }
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        }
    }

    fn initialize(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    async fn call_tool(&self, params: ToolCallParams) -> ToolCallResult {
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let output = self
            .registry
            .execute(&params.name, arguments, &self.state)
            .await;
        ToolCallResult::text(output.text(), output.is_error)
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
