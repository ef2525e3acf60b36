//! Tool-invocation client on top of the JSON-RPC transport.
//!
//! Drives the MCP `initialize` handshake once per connection, then exposes
//! `call_tool` for the two tools this crate uses: `so_search` and
//! `get_content`. Every remote wait runs under a caller-supplied deadline;
//! an expired deadline is an error, never an automatic retry.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;

use super::transport::{StdioTransport, Transport, TransportError};

const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ToolError {
    /// Connecting or handshaking with the bridge failed. Session is over.
    Connect(TransportError),
    /// A tool call failed or the server flagged the result as an error.
    /// The session continues; only this query is lost.
    Call(String),
    /// A remote wait exceeded its deadline.
    Timeout(&'static str),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Connect(e) => write!(f, "connection failed: {e}"),
            ToolError::Call(msg) => write!(f, "tool call failed: {msg}"),
            ToolError::Timeout(what) => write!(f, "{what} timed out"),
        }
    }
}

impl std::error::Error for ToolError {}

impl ToolError {
    /// True when the failure was the bridge command missing from PATH,
    /// the one case that gets install guidance instead of a raw error.
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, ToolError::Connect(e) if e.is_command_not_found())
    }
}

// ============================================================================
// Result Extraction
// ============================================================================

#[derive(Debug, Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<ContentPart>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    part_type: String,
    #[serde(default)]
    text: String,
}

/// Concatenates the text parts of a tool result, newline-separated.
fn extract_text(result: &CallToolResult) -> String {
    let parts: Vec<&str> = result
        .content
        .iter()
        .filter(|p| p.part_type == "text")
        .map(|p| p.text.as_str())
        .collect();
    parts.join("\n")
}

// ============================================================================
// Client
// ============================================================================

pub struct ToolClient {
    transport: Box<dyn Transport>,
}

impl ToolClient {
    /// Spawns the bridge and completes the MCP handshake, all under
    /// `connect_timeout`. The first run may hang on a browser OAuth flow,
    /// which is why the connect deadline is much longer than a call's.
    pub async fn connect(
        command: &str,
        args: &[String],
        connect_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let transport = StdioTransport::spawn(command, args).map_err(ToolError::Connect)?;
        let mut client = Self::with_transport(Box::new(transport));
        timeout(connect_timeout, client.initialize())
            .await
            .map_err(|_| ToolError::Timeout("connection"))??;
        Ok(client)
    }

    /// Wraps an existing transport. Test seam; production goes through
    /// [`ToolClient::connect`].
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn initialize(&mut self) -> Result<(), ToolError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "soq",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });
        let result = self
            .transport
            .request("initialize", params)
            .await
            .map_err(ToolError::Connect)?;
        debug!("initialize result: {result}");

        self.transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(ToolError::Connect)?;
        info!("MCP handshake complete");
        Ok(())
    }

    /// Invokes a named tool and returns the extracted text content.
    ///
    /// The returned string may be empty (the server answered with no text
    /// parts); callers treat that as "no results", not as an error.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        call_timeout: Duration,
    ) -> Result<String, ToolError> {
        info!("Calling tool {name}");
        let params = json!({ "name": name, "arguments": arguments });

        let result = timeout(call_timeout, self.transport.request("tools/call", params))
            .await
            .map_err(|_| ToolError::Timeout("tool call"))?
            .map_err(|e| ToolError::Call(e.to_string()))?;

        let result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Call(format!("unexpected tool result shape: {e}")))?;

        let text = extract_text(&result);
        if result.is_error {
            warn!("Tool {name} returned an error payload");
            return Err(ToolError::Call(if text.is_empty() {
                format!("tool {name} reported an error")
            } else {
                text
            }));
        }

        debug!("Tool {name} returned {} bytes of text", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;

    const CALL_TIMEOUT: Duration = Duration::from_secs(5);

    fn text_result(text: &str) -> Value {
        json!({ "content": [{ "type": "text", "text": text }] })
    }

    #[tokio::test]
    async fn test_call_tool_extracts_text() {
        let transport = MockTransport::new(vec![Ok(text_result("hello"))]);
        let mut client = ToolClient::with_transport(Box::new(transport));

        let text = client
            .call_tool("so_search", json!({"query": "q"}), CALL_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_call_tool_joins_multiple_text_parts() {
        let result = json!({ "content": [
            { "type": "text", "text": "part one" },
            { "type": "image", "data": "ignored" },
            { "type": "text", "text": "part two" },
        ]});
        let transport = MockTransport::new(vec![Ok(result)]);
        let mut client = ToolClient::with_transport(Box::new(transport));

        let text = client.call_tool("so_search", json!({}), CALL_TIMEOUT).await.unwrap();
        assert_eq!(text, "part one\npart two");
    }

    #[tokio::test]
    async fn test_call_tool_error_payload() {
        let result = json!({
            "isError": true,
            "content": [{ "type": "text", "text": "rate limited" }],
        });
        let transport = MockTransport::new(vec![Ok(result)]);
        let mut client = ToolClient::with_transport(Box::new(transport));

        let err = client.call_tool("so_search", json!({}), CALL_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ToolError::Call(ref msg) if msg == "rate limited"));
    }

    #[tokio::test]
    async fn test_call_tool_transport_error_becomes_call_error() {
        let transport = MockTransport::new(vec![Err(TransportError::Closed)]);
        let mut client = ToolClient::with_transport(Box::new(transport));

        let err = client.call_tool("so_search", json!({}), CALL_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ToolError::Call(_)));
    }

    #[tokio::test]
    async fn test_call_tool_sends_name_and_arguments() {
        let transport = MockTransport::new(vec![Ok(text_result(""))]);
        let log = transport.log();
        let mut client = ToolClient::with_transport(Box::new(transport));

        client
            .call_tool("get_content", json!({"query": "SO_A42"}), CALL_TIMEOUT)
            .await
            .unwrap();

        let recorded = log.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let (method, params) = &recorded[0];
        assert_eq!(method, "tools/call");
        assert_eq!(params["name"], "get_content");
        assert_eq!(params["arguments"]["query"], "SO_A42");
    }
}
