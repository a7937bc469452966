use reqwest::Method;
use serde_json::Value;

/// A fully-resolved outbound HTTP call for one `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// Uppercased HTTP method.
    pub method: Method,
    /// Base URL + substituted path + query string.
    pub url: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl PreparedRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            url: url.into(),
            body,
        }
    }
}
