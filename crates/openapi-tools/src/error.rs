//! Error types for `unrelated-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("invalid OpenAPI spec URL '{url}': {source}")]
    InvalidSpecUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("spec request to '{url}' returned HTTP {status}")]
    SpecStatus { url: String, status: u16 },

    #[error("failed to read spec body from '{url}': {message}")]
    SpecReadBody { url: String, message: String },

    #[error("failed to parse OpenAPI spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// The spec host could not be reached during live tool generation.
    #[error("spec host for '{url}' is unreachable: {message}")]
    SpecUnreachable { url: String, message: String },

    /// `OpenAPI` errors (unusable document content, e.g. an invalid server URL).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),
}

impl OpenApiToolsError {
    /// Whether this error means the spec host could not be reached (as opposed to a bad
    /// document or a bad request).
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            OpenApiToolsError::SpecFetch { .. } | OpenApiToolsError::SpecUnreachable { .. }
        )
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
