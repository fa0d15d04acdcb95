//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC validation, negotiation, formatting,
//! per-request session context, and method routing.

pub mod rpc;
pub mod server;
pub mod session;
