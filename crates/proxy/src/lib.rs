//! OpenAPI -> MCP stdio proxy.
//!
//! Reads line-delimited JSON-RPC from stdin, serves `initialize`, `tools/list` and
//! `tools/call` from an `OpenAPI` document, and writes one JSON response per line to stdout.
//! Logs go to stderr only.

pub mod cache;
pub mod error;
pub mod protocol;
pub mod session;
