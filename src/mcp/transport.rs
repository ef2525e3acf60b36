//! JSON-RPC 2.0 over a child process's stdio.
//!
//! The Stack Overflow MCP server is reached through a bridge subprocess
//! (`npx -y mcp-remote https://mcp.stackoverflow.com`) that speaks
//! newline-delimited JSON-RPC on stdin/stdout:
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"so_search","arguments":{...}}}
//! ← {"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"..."}]}}
//! ```
//!
//! Calls are strictly sequential (one in flight at a time), so responses are
//! correlated by id with a simple read-until-match loop. Server-initiated
//! notifications arriving in between are logged and skipped.

use std::fmt;
use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum TransportError {
    /// The bridge process could not be started. Fatal for the session.
    Spawn(io::Error),
    /// Reading from or writing to the bridge failed.
    Io(io::Error),
    /// The bridge produced output we could not interpret.
    Protocol(String),
    /// The server answered with a JSON-RPC error object.
    Rpc { code: i64, message: String },
    /// The bridge closed its stdout (process exited).
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Spawn(e) => write!(f, "failed to spawn MCP bridge: {e}"),
            TransportError::Io(e) => write!(f, "bridge I/O error: {e}"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            TransportError::Rpc { code, message } => {
                write!(f, "server error {code}: {message}")
            }
            TransportError::Closed => write!(f, "bridge process closed the connection"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// True when the bridge command itself was not found on PATH.
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, TransportError::Spawn(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Seam between the tool client and the wire. Tests substitute a scripted
/// implementation; production uses [`StdioTransport`].
#[async_trait]
pub trait Transport: Send {
    /// Sends a request and waits for the matching response's `result`.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Sends a notification (no id, no response expected).
    async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError>;
}

// ============================================================================
// Stdio Implementation
// ============================================================================

#[derive(Debug)]
pub struct StdioTransport {
    // Held so the child is reaped (and killed, via kill_on_drop) with us.
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioTransport {
    /// Spawns the bridge command with piped stdio. The child's stderr is
    /// drained to the log so OAuth prompts and bridge diagnostics show up in
    /// `soq.log` instead of corrupting the display.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, TransportError> {
        debug!("Spawning MCP bridge: {command} {args:?}");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransportError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("child stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("bridge: {line}");
                }
            });
        }

        Ok(Self {
            _child: child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn send(&mut self, request: &RpcRequest<'_>) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        debug!("→ {line}");
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        self.stdin.flush().await.map_err(TransportError::Io)
    }

    /// Reads lines until the response with `id` arrives. Notifications and
    /// non-JSON chatter from the bridge are skipped.
    async fn read_response(&mut self, id: u64) -> Result<Value, TransportError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(TransportError::Io)?
                .ok_or(TransportError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("← {line}");

            let response: RpcResponse = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(_) => {
                    warn!("Skipping non-JSON line from bridge: {line}");
                    continue;
                }
            };

            match response.id {
                Some(rid) if rid == id => {
                    if let Some(err) = response.error {
                        return Err(TransportError::Rpc {
                            code: err.code,
                            message: err.message,
                        });
                    }
                    return Ok(response.result.unwrap_or(Value::Null));
                }
                // Notification or a stale response, not ours.
                _ => debug!("Skipping message with id {:?}", response.id),
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&RpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        })
        .await?;
        self.read_response(id).await
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        self.send(&RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_includes_id() {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: Some(7),
            method: "tools/call",
            params: json!({"name": "so_search"}),
        };
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains(r#""jsonrpc":"2.0""#));
        assert!(text.contains(r#""id":7"#));
        assert!(text.contains(r#""method":"tools/call""#));
    }

    #[test]
    fn test_notification_serialization_omits_id() {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: "notifications/initialized",
            params: json!({}),
        };
        let text = serde_json::to_string(&req).unwrap();
        assert!(!text.contains(r#""id""#));
    }

    #[test]
    fn test_spawn_unknown_command_is_not_found() {
        // Needs a runtime for tokio::process even though spawn fails.
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = StdioTransport::spawn("soq-definitely-not-a-command", &[]).unwrap_err();
        assert!(err.is_command_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_round_trip_over_child_stdio() {
        // A shell stand-in for the bridge: reads one request line, answers it,
        // after first emitting a notification line that must be skipped.
        let script = r#"read line
printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#;
        let mut transport =
            StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap();

        let result = transport.request("tools/list", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_surfaces_rpc_error() {
        let script = r#"read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}'"#;
        let mut transport =
            StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap();

        let err = transport.request("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::Rpc { code: -32601, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_reports_closed_on_eof() {
        let mut transport =
            StdioTransport::spawn("sh", &["-c".to_string(), "read line".to_string()]).unwrap();

        let err = transport.request("tools/list", json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
