//! Integration tests for the MCP server.
//!
//! These drive a full server over an in-memory duplex stream, speaking the
//! same newline-delimited JSON-RPC a real client sends over stdio.

use std::path::Path;

use serde_json::{Value, json};
use termgate_mcp::{McpServer, StdioTransport};
use termgate_sandbox::{SandboxConfig, Session, WorkingDirectory};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::io::{Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    next_id: i64,
}

impl Client {
    async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let message = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });
        self.send(&message).await;
        let line = self
            .lines
            .next_line()
            .await
            .expect("read response")
            .expect("server closed the stream");
        let response: Value = serde_json::from_str(&line).expect("response is JSON");
        assert_eq!(response["id"], self.next_id);
        response
    }

    async fn send(&mut self, message: &Value) {
        let mut line = serde_json::to_string(message).unwrap();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Value {
        let response = self
            .request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await;
        assert!(response.get("error").is_none(), "unexpected error: {response}");
        response["result"].clone()
    }
}

fn text(result: &Value) -> String {
    result["content"]
        .as_array()
        .expect("content array")
        .iter()
        .filter_map(|c| c["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_error(result: &Value) -> bool {
    result["isError"].as_bool().unwrap_or(false)
}

fn start(root: &Path) -> (Client, JoinHandle<termgate_mcp::Result<()>>) {
    let config = SandboxConfig::new().with_boundary(root).with_shell("/bin/sh");
    let session = Session::new(&config, WorkingDirectory::new(root));
    let mut server = McpServer::new(session);

    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let handle = tokio::spawn(async move {
        let mut transport = StdioTransport::new(BufReader::new(server_read), server_write);
        server.serve(&mut transport).await
    });

    let (client_read, client_write) = tokio::io::split(client_side);
    let client = Client {
        writer: client_write,
        lines: BufReader::new(client_read).lines(),
        next_id: 0,
    };
    (client, handle)
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let temp = tempfile::tempdir().unwrap();
    let (mut client, _server) = start(temp.path());

    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }),
        )
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], "termgate");
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

    client
        .send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;

    let list = client.request("tools/list", json!({})).await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, ["execute_command", "mkdir", "cd", "git_apply"]);

    let pong = client.request("ping", json!({})).await;
    assert_eq!(pong["result"], json!({}));
}

#[tokio::test]
async fn test_mkdir_cd_and_relative_resolution() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let (mut client, _server) = start(root);

    let first = client.call("mkdir", json!({"path": "app/src"})).await;
    assert!(!is_error(&first), "{first}");
    let second = client.call("mkdir", json!({"path": "app/src"})).await;
    assert!(!is_error(&second), "mkdir must be idempotent: {second}");
    assert!(root.join("app/src").is_dir());

    let cd = client.call("cd", json!({"path": "app"})).await;
    assert!(!is_error(&cd));
    assert!(text(&cd).contains("Changed directory to:"));

    // Relative paths now resolve from app/.
    let nested = client
        .call("execute_command", json!({"command": "mkdir -p ../docs lib"}))
        .await;
    assert!(!is_error(&nested), "{nested}");
    assert!(root.join("docs").is_dir());
    assert!(root.join("app/lib").is_dir());

    let escape = client
        .call("execute_command", json!({"command": "mkdir ../../escape"}))
        .await;
    assert!(is_error(&escape));
    assert!(text(&escape).contains("path outside sandbox"));
}

#[tokio::test]
async fn test_failed_cd_leaves_directory_alone() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let (mut client, _server) = start(root);

    let outside = client.call("cd", json!({"path": "/"})).await;
    assert!(is_error(&outside));

    let missing = client.call("cd", json!({"path": "nope"})).await;
    assert!(is_error(&missing));
    assert!(text(&missing).contains("Failed to change directory"));

    client.call("mkdir", json!({"path": "here"})).await;
    assert!(root.join("here").is_dir());
}

#[tokio::test]
async fn test_denials_are_error_results() {
    let temp = tempfile::tempdir().unwrap();
    let (mut client, _server) = start(temp.path());

    for (command, expected) in [
        ("git push origin main", "not in allow-list"),
        ("rm -rf /", "not in allow-list"),
        ("sed -i 's/a/b/' /etc/passwd", "path outside sandbox"),
        ("sed 's/a/b/' file.txt", "malformed sed invocation"),
        ("sed -i 's/a/b/' ~/notes.txt", "malformed sed invocation"),
        ("sed -i 's/a/b/' $HOME/notes.txt", "malformed sed invocation"),
        ("cd", "missing path argument"),
    ] {
        let result = client
            .call("execute_command", json!({"command": command}))
            .await;
        assert!(is_error(&result), "{command} should be denied");
        assert!(
            text(&result).contains(expected),
            "{command}: expected {expected:?} in {:?}",
            text(&result)
        );
    }

    let invalid = client.call("execute_command", json!({"cmd": "git status"})).await;
    assert!(is_error(&invalid));
    assert!(text(&invalid).contains("Invalid arguments"));
}

#[tokio::test]
async fn test_git_apply_streams_patch() {
    if std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_err()
    {
        eprintln!("Skipping test: git not installed");
        return;
    }

    let temp = tempfile::tempdir().unwrap();
    let (mut client, _server) = start(temp.path());

    let patch = "\
diff --git a/hello.txt b/hello.txt
new file mode 100644
--- /dev/null
+++ b/hello.txt
@@ -0,0 +1 @@
+hello
";
    let result = client.call("git_apply", json!({"patch": patch})).await;
    assert!(!is_error(&result), "{result}");
    assert_eq!(
        std::fs::read_to_string(temp.path().join("hello.txt")).unwrap(),
        "hello\n"
    );

    let bad = client
        .call("git_apply", json!({"patch": "this is not a patch\n"}))
        .await;
    assert!(is_error(&bad));
}

#[tokio::test]
async fn test_content_length_framing() {
    let temp = tempfile::tempdir().unwrap();
    let config = SandboxConfig::new().with_boundary(temp.path());
    let mut server = McpServer::new(Session::new(&config, WorkingDirectory::new(temp.path())));

    let body = r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#;
    let input = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    let (mut client, server_side) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_side);

    client.write_all(input.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();

    let mut transport = StdioTransport::new(BufReader::new(server_read), server_write);
    server.serve(&mut transport).await.unwrap();
    drop(transport);

    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();
    let (header, json_body) = output.split_once("\r\n\r\n").expect("framed reply");
    assert_eq!(header, format!("Content-Length: {}", json_body.len()));
    let reply: Value = serde_json::from_str(json_body).unwrap();
    assert_eq!(reply["id"], 9);
}

#[tokio::test]
async fn test_server_keeps_running_after_bad_frames() {
    let temp = tempfile::tempdir().unwrap();
    let (mut client, server) = start(temp.path());

    let frames: [&[u8]; 2] = [b"\xff\xfe not utf-8\n", b"{\"jsonrpc\": \n"];
    for bad in frames {
        client.writer.write_all(bad).await.unwrap();
        let line = client.lines.next_line().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(reply["error"]["code"], -32700, "{line}");
        assert!(reply["id"].is_null());
    }

    let pong = client.request("ping", json!({})).await;
    assert_eq!(pong["result"], json!({}));
    assert!(!server.is_finished());
}

#[tokio::test]
async fn test_server_stops_on_eof() {
    let temp = tempfile::tempdir().unwrap();
    let (client, server) = start(temp.path());
    drop(client);
    server.await.unwrap().unwrap();
}
