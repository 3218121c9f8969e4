//! The tool catalog and argument validation.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use termgate_sandbox::{CommandOutput, SandboxError, SandboxResult, Session};

use crate::protocol::ToolInfo;

/// Run an allowed command string.
pub const EXECUTE_COMMAND: &str = "execute_command";
/// Create a directory inside the sandbox.
pub const MKDIR: &str = "mkdir";
/// Change the session working directory.
pub const CD: &str = "cd";
/// Apply a patch with `git apply` over stdin.
pub const GIT_APPLY: &str = "git_apply";

/// Names of every tool the server exposes.
pub const TOOL_NAMES: &[&str] = &[EXECUTE_COMMAND, MKDIR, CD, GIT_APPLY];

#[derive(Debug, Deserialize)]
struct CommandArgs {
    command: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct PatchArgs {
    patch: String,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ExecuteCommand { command: String },
    Mkdir { path: String },
    Cd { path: String },
    GitApply { patch: String },
}

impl ToolCall {
    /// Validate the arguments of a known tool.
    ///
    /// Returns `Ok(None)` when the tool name is not in the catalog.
    pub fn parse(name: &str, arguments: Option<Value>) -> SandboxResult<Option<Self>> {
        let arguments = arguments.unwrap_or_else(|| json!({}));
        let call = match name {
            EXECUTE_COMMAND => {
                let args: CommandArgs = parse_args(name, arguments)?;
                ToolCall::ExecuteCommand {
                    command: args.command,
                }
            }
            MKDIR => ToolCall::Mkdir {
                path: parse_args::<PathArgs>(name, arguments)?.path,
            },
            CD => ToolCall::Cd {
                path: parse_args::<PathArgs>(name, arguments)?.path,
            },
            GIT_APPLY => ToolCall::GitApply {
                patch: parse_args::<PatchArgs>(name, arguments)?.patch,
            },
            _ => return Ok(None),
        };
        Ok(Some(call))
    }

    /// The tool name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ExecuteCommand { .. } => EXECUTE_COMMAND,
            ToolCall::Mkdir { .. } => MKDIR,
            ToolCall::Cd { .. } => CD,
            ToolCall::GitApply { .. } => GIT_APPLY,
        }
    }

    /// Authorize and run this call in `session`.
    pub async fn run(&self, session: &mut Session) -> SandboxResult<CommandOutput> {
        match self {
            ToolCall::ExecuteCommand { command } => session.execute_command(command).await,
            ToolCall::Mkdir { path } => session.mkdir(path).await,
            ToolCall::Cd { path } => session.cd(path).await,
            ToolCall::GitApply { patch } => session.apply_patch(patch).await,
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> SandboxResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| SandboxError::validation(format!("{}: {}", tool, e)))
}

/// Tool definitions advertised in `tools/list`.
pub fn catalog(boundary: Option<&Path>) -> Vec<ToolInfo> {
    let within = match boundary {
        Some(dir) => format!("within {}", dir.display()),
        None => "within the allowed directory (none configured)".to_string(),
    };

    vec![
        ToolInfo {
            name: EXECUTE_COMMAND.to_string(),
            description: Some(format!(
                "Execute a terminal command and get its output. Only allowed commands \
                 (git, npm, yarn, jest, vitest, cypress, eslint, prettier, tsc, sed -i) \
                 are permitted and file arguments must be {}.",
                within
            )),
            input_schema: string_schema("command", "The command line to run"),
        },
        ToolInfo {
            name: MKDIR.to_string(),
            description: Some(format!(
                "Create a new directory (and any missing parents) {}.",
                within
            )),
            input_schema: string_schema("path", "Directory to create"),
        },
        ToolInfo {
            name: CD.to_string(),
            description: Some(format!(
                "Change to any directory {} or its subdirectories.",
                within
            )),
            input_schema: string_schema("path", "Directory to change to"),
        },
        ToolInfo {
            name: GIT_APPLY.to_string(),
            description: Some(
                "Apply a unified diff with `git apply` in the current directory. \
                 The patch is passed over stdin."
                    .to_string(),
            ),
            input_schema: string_schema("patch", "Unified diff to apply"),
        },
    ]
}

fn string_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            (field): { "type": "string", "description": description }
        },
        "required": [field],
        "additionalProperties": false
    })
}
