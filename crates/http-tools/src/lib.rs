//! Downstream HTTP runtime for the OpenAPI MCP proxy.
//!
//! This crate is intended to be used by:
//! - `unrelated-openapi-tools` (produces [`request::PreparedRequest`]s)
//! - `unrelated-openapi-mcp-proxy` (executes them and tracks [`mode::OperationMode`])
//!
//! It intentionally knows nothing about `OpenAPI` documents or the MCP wire protocol.

pub mod mode;
pub mod request;
pub mod runtime;
pub mod safety;
