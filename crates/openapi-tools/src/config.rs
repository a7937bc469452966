use std::time::Duration;

/// Timeout for fetching the spec (and for the live reachability check of the spec host).
pub const DEFAULT_SPEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for an OpenAPI-based tool source.
#[derive(Debug, Clone)]
pub struct ToolSourceConfig {
    /// `OpenAPI` spec location (http(s) URL).
    pub spec_url: String,

    /// Tool name prefix. Empty, or ends with exactly one `_` (see [`normalize_tool_prefix`]).
    pub tool_prefix: String,

    /// Spec fetch timeout.
    pub spec_timeout: Duration,
}

impl ToolSourceConfig {
    #[must_use]
    pub fn new(spec_url: impl Into<String>) -> Self {
        Self {
            spec_url: spec_url.into(),
            tool_prefix: String::new(),
            spec_timeout: DEFAULT_SPEC_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_tool_prefix(mut self, prefix: &str) -> Self {
        self.tool_prefix = normalize_tool_prefix(prefix);
        self
    }

    #[must_use]
    pub fn with_spec_timeout(mut self, timeout: Duration) -> Self {
        self.spec_timeout = timeout;
        self
    }
}

/// Normalize a user-supplied tool prefix so it ends with exactly one `_`.
///
/// Prefixes that are empty (or consist only of underscores) disable prefixing.
#[must_use]
pub fn normalize_tool_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('_');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_gets_exactly_one_trailing_underscore() {
        assert_eq!(normalize_tool_prefix(""), "");
        assert_eq!(normalize_tool_prefix("myapp"), "myapp_");
        assert_eq!(normalize_tool_prefix("myapp_"), "myapp_");
        assert_eq!(normalize_tool_prefix("myapp___"), "myapp_");
        assert_eq!(normalize_tool_prefix("___"), "");
    }

    #[test]
    fn builder_applies_prefix_normalization() {
        let cfg = ToolSourceConfig::new("http://127.0.0.1/openapi.json").with_tool_prefix("pets");
        assert_eq!(cfg.tool_prefix, "pets_");
        assert_eq!(cfg.spec_timeout, DEFAULT_SPEC_TIMEOUT);
    }
}
