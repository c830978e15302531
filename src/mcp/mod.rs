//! MCP (Model Context Protocol) server
//!
//! Exposes the tool registry to an agent via JSON-RPC over stdio.

mod protocol;
mod server;

pub use protocol::*;
pub use server::McpServer;
