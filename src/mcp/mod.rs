//! MCP (Model Context Protocol) server implementation
//!
//! Exposes per-project financial queries over stdio for a conversational
//! agent.

mod server;
mod tools;
mod types;

pub use server::McpServer;
pub use tools::{get_tool_definitions, handle_tool_call};
pub use types::{McpError, McpRequest, McpResponse, ToolDefinition, ToolResult};
