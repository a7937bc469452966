//! `OpenAPI` -> MCP tool translation.
//!
//! This crate is intended to be used by `unrelated-openapi-mcp-proxy`. It loads an `OpenAPI`
//! document, turns every operation into an MCP [`rmcp::model::Tool`], and turns a
//! `tools/call` (name + arguments) back into an outbound HTTP request.
//!
//! It intentionally contains **no** protocol loop and **no** online/offline policy.

pub mod config;
pub mod error;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod spec;
