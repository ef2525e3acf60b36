//! MCP plumbing: subprocess transport and tool-invocation client.

pub mod client;
pub mod transport;

pub use client::{ToolClient, ToolError};
pub use transport::{StdioTransport, Transport, TransportError};
