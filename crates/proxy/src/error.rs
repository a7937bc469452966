//! Error types for the proxy.

use thiserror::Error;
use unrelated_openapi_tools::error::OpenApiToolsError;

/// Main error type for the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The `OpenAPI` spec could not be fetched or parsed at startup.
    #[error("failed to load OpenAPI specification: {0}")]
    SpecLoad(#[from] OpenApiToolsError),

    /// IO errors (stdio, cache files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
