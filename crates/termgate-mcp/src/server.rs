//! Request dispatch for the MCP server.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use termgate_sandbox::{SandboxError, Session};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::Result;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ToolInfo,
};
use crate::tools::{ToolCall, catalog};
use crate::transport::{Incoming, StdioTransport};

/// MCP server exposing one sandbox session.
///
/// Requests are handled strictly one after another, so a `cd` is always
/// finished before the next command is authorized.
pub struct McpServer {
    session: Session,
    tools: Vec<ToolInfo>,
}

impl McpServer {
    /// Create a server around a session.
    pub fn new(session: Session) -> Self {
        let tools = catalog(session.gateway().sandbox().boundary());
        Self { session, tools }
    }

    /// The session served by this server.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve requests until the input stream closes.
    pub async fn serve<R, W>(&mut self, transport: &mut StdioTransport<R, W>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            boundary = ?self.session.gateway().sandbox().boundary(),
            cwd = %self.session.working_directory().path().display(),
            "MCP server ready"
        );

        while let Some(incoming) = transport.read_message().await? {
            let response = match incoming {
                Incoming::Message(message) => self.handle_message(&message).await,
                Incoming::Malformed(reason) => {
                    tracing::warn!(%reason, "undecodable frame");
                    Some(parse_error(reason))
                }
            };
            if let Some(response) = response {
                let body = serde_json::to_string(&response)?;
                transport.write_message(&body).await?;
            }
        }

        tracing::info!("input closed, shutting down");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no response.
    pub async fn handle_message(&mut self, raw: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "unparsable message");
                return Some(parse_error(e));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(
                        JsonRpcError::INVALID_REQUEST,
                        format!("Invalid request: {}", e),
                    ),
                ));
            }
        };

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }

        let id = request.id.clone();
        let response = match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        Some(response)
    }

    async fn dispatch(&mut self, request: JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        tracing::debug!(method = %request.method, id = ?request.id, "request received");

        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = match request.params {
                    Some(params) => parse_params(params)?,
                    None => InitializeParams::default(),
                };
                let client = params.client_info.unwrap_or_default();
                tracing::info!(
                    client = %client.name,
                    client_version = %client.version,
                    protocol = ?params.protocol_version,
                    "client initialized"
                );
                to_result(InitializeResult::default())
            }
            "ping" => Ok(json!({})),
            "tools/list" => to_result(ListToolsResult {
                tools: self.tools.clone(),
            }),
            "tools/call" => {
                let params: CallToolParams = match request.params {
                    Some(params) => parse_params(params)?,
                    None => {
                        return Err(JsonRpcError::new(
                            JsonRpcError::INVALID_PARAMS,
                            "tools/call requires params",
                        ));
                    }
                };
                to_result(self.call_tool(params).await)
            }
            other => Err(JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Validate, authorize and run a tool call.
    ///
    /// Every failure becomes an error result; nothing here ends the server.
    pub async fn call_tool(&mut self, params: CallToolParams) -> CallToolResult {
        let name = params.name;
        let call = match ToolCall::parse(&name, params.arguments) {
            Ok(Some(call)) => call,
            Ok(None) => {
                tracing::warn!(tool = %name, "unknown tool");
                return CallToolResult::error(format!("Unknown tool: {}", name));
            }
            Err(e) => return tool_failure(&name, e),
        };

        match call.run(&mut self.session).await {
            Ok(output) => {
                tracing::debug!(tool = %name, exit_code = output.exit_code, "tool call succeeded");
                CallToolResult::success(output.stdout, &output.stderr)
            }
            Err(e) => tool_failure(&name, e),
        }
    }
}

fn parse_error(detail: impl std::fmt::Display) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        None,
        JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("Parse error: {}", detail)),
    )
}

fn tool_failure(tool: &str, error: SandboxError) -> CallToolResult {
    tracing::warn!(tool, kind = error.kind().as_str(), error = %error, "tool call failed");
    CallToolResult::error(error)
}

fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| {
        JsonRpcError::new(JsonRpcError::INVALID_PARAMS, format!("Invalid params: {}", e))
    })
}

fn to_result<T: Serialize>(value: T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}
