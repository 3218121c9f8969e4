//! Error types for the MCP server.

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// These are stream failures that end the server. Tool failures never surface
/// here; they become error tool results.
#[derive(Debug, Error)]
pub enum McpError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
