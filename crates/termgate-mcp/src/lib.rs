//! MCP (Model Context Protocol) server for termgate.
//!
//! Exposes a sandbox [`Session`](termgate_sandbox::Session) to an MCP client
//! over stdio.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpServer                                                  │
//! │  - initialize, ping, tools/list, tools/call                 │
//! │  - one Session per connection, one request at a time        │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StdioTransport                                             │
//! │  - JSON-RPC 2.0, newline-delimited or Content-Length framed │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Tools
//!
//! | Tool | Arguments | Effect |
//! |------|-----------|--------|
//! | `execute_command` | `command` | Authorize and run a command line |
//! | `mkdir` | `path` | Create a directory inside the sandbox |
//! | `cd` | `path` | Change the session working directory |
//! | `git_apply` | `patch` | Stream a patch into `git apply` |
//!
//! Tool failures (validation, denial, execution, path) come back as results
//! with `isError: true`. Undecodable frames get a parse error reply. Only I/O
//! failures on the stream end the server.

pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, ServerInfo, ToolContent, ToolInfo,
};
pub use server::McpServer;
pub use tools::{ToolCall, catalog};
pub use transport::{Framing, Incoming, StdioTransport};
