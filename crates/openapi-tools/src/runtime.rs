//! OpenAPI-backed tool source.
//!
//! Owns the loaded [`SpecDocument`] and the [`ToolRegistry`] built from it, and converts a
//! `tools/call` (tool name + JSON arguments) into a [`PreparedRequest`].

use crate::config::ToolSourceConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::schema::build_input_schema;
use crate::spec::{ApiOperation, SpecDocument};
use regex::Regex;
use reqwest::{Client, Method};
use rmcp::model::{JsonObject, Tool};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use unrelated_http_tools::request::PreparedRequest;
use unrelated_http_tools::safety::{redact_url_str, sanitize_reqwest_error};

static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid regex"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));

/// Tool name -> index into [`SpecDocument::operations`].
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

pub struct OpenApiToolSource {
    config: ToolSourceConfig,
    doc: SpecDocument,
    client: Client,
    registry: ToolRegistry,
}

impl OpenApiToolSource {
    /// Fetch and parse the spec. The registry stays empty until tools are generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be fetched or parsed.
    pub async fn load(config: ToolSourceConfig, client: Client) -> Result<Self> {
        let doc = SpecDocument::load(&config, &client).await?;
        Ok(Self::from_document(config, doc, client))
    }

    #[must_use]
    pub fn from_document(config: ToolSourceConfig, doc: SpecDocument, client: Client) -> Self {
        Self {
            config,
            doc,
            client,
            registry: ToolRegistry::default(),
        }
    }

    #[must_use]
    pub fn spec_url(&self) -> &str {
        &self.config.spec_url
    }

    #[must_use]
    pub fn document(&self) -> &SpecDocument {
        &self.doc
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Check that the spec host still answers, then generate tools.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecUnreachable`] if the spec host cannot be reached; the
    /// registry is left untouched in that case.
    pub async fn generate_live_tools(&mut self) -> Result<Vec<Tool>> {
        self.check_spec_reachable().await?;
        Ok(self.generate_tools())
    }

    /// HEAD the spec URL. Any HTTP response counts as reachable; only transport errors and
    /// timeouts fail.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecUnreachable`] on transport failure.
    pub async fn check_spec_reachable(&self) -> Result<()> {
        self.client
            .head(self.config.spec_url.as_str())
            .timeout(self.config.spec_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| OpenApiToolsError::SpecUnreachable {
                url: redact_url_str(&self.config.spec_url),
                message: sanitize_reqwest_error(&e),
            })
    }

    /// Build one tool per operation and replace the registry with the new names.
    pub fn generate_tools(&mut self) -> Vec<Tool> {
        let resolver = self.doc.resolver();
        let mut registry = ToolRegistry::default();
        let mut tools = Vec::with_capacity(self.doc.operations().len());

        for (index, op) in self.doc.operations().iter().enumerate() {
            let name = self.register(&mut registry, op, index);
            let input_schema = build_input_schema(resolver, op);
            tools.push(Tool::new(name, tool_description(op), Arc::new(input_schema)));
        }

        tracing::info!(count = tools.len(), "generated tools from OpenAPI spec");
        self.registry = registry;
        tools
    }

    /// Rebuild the registry without producing tool definitions.
    ///
    /// Used when the tool list itself comes from the cache: names are derived exactly as in
    /// [`Self::generate_tools`], so cached tools stay callable.
    pub fn rebuild_registry(&mut self) {
        let mut registry = ToolRegistry::default();
        for (index, op) in self.doc.operations().iter().enumerate() {
            self.register(&mut registry, op, index);
        }
        self.registry = registry;
    }

    fn register(&self, registry: &mut ToolRegistry, op: &ApiOperation, index: usize) -> String {
        let base = format!("{}{}", self.config.tool_prefix, base_tool_name(op));
        let name = reserve_unique_tool_name(&registry.by_name, &base);
        if name != base {
            tracing::warn!(
                tool = %name,
                method = %op.method,
                path = %op.path,
                "tool name collision, added numeric suffix"
            );
        }
        registry.by_name.insert(name.clone(), index);
        name
    }

    /// Turn a tool call into an outbound HTTP request.
    ///
    /// Each argument is routed, in the order given, by the first rule that applies:
    /// 1. `body` is the whole request body;
    /// 2. a `{key}` placeholder in the path is substituted;
    /// 3. a declared query parameter goes into the query string;
    /// 4. when the operation has a request body, the key becomes a body property;
    /// 5. anything else goes into the query string.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::ToolNotFound`] if `name` is not in the registry.
    pub fn prepare_http_request(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<PreparedRequest> {
        let op = self
            .registry
            .get(name)
            .and_then(|index| self.doc.operations().get(index))
            .ok_or_else(|| OpenApiToolsError::ToolNotFound(name.to_string()))?;

        let mut path = op.path.clone();
        let mut query: Vec<String> = Vec::new();
        let mut body: Option<Value> = None;
        let mut body_properties = JsonObject::new();

        for (key, value) in arguments.into_iter().flatten() {
            if key == "body" {
                body = Some(value.clone());
                continue;
            }

            let placeholder = format!("{{{key}}}");
            if path.contains(&placeholder) {
                path = path.replace(&placeholder, &encode_component(&value_to_string(value)));
            } else if op.is_query_parameter(key) || op.request_body.is_none() {
                query.push(query_pair(key, value));
            } else {
                body_properties.insert(key.clone(), value.clone());
            }
        }

        if body.as_ref().is_none_or(Value::is_null) && !body_properties.is_empty() {
            body = Some(Value::Object(body_properties));
        }

        let mut url = format!("{}{path}", self.doc.base_url());
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        Ok(PreparedRequest::new(resolve_http_method(&op.method)?, url, body))
    }
}

fn tool_description(op: &ApiOperation) -> String {
    op.summary
        .iter()
        .chain(op.description.iter())
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("{} {}", op.method.to_uppercase(), op.path))
}

/// `operationId` when present (and not empty after sanitizing), else `<method>_<path>`.
fn base_tool_name(op: &ApiOperation) -> String {
    if let Some(id) = op.operation_id.as_deref() {
        let name = sanitize_tool_name(id);
        if !name.is_empty() {
            return name;
        }
    }
    sanitize_tool_name(&format!("{}_{}", op.method, op.path).to_lowercase())
}

/// Restrict a name to `[a-z0-9_]`: other characters become `_`, runs of `_` collapse,
/// boundary `_` are trimmed, and a leading digit gets an `op_` prefix.
#[must_use]
pub fn sanitize_tool_name(name: &str) -> String {
    let replaced = INVALID_NAME_CHARS.replace_all(name, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let name = collapsed.trim_matches('_').to_lowercase();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("op_{name}")
    } else {
        name
    }
}

fn reserve_unique_tool_name(taken: &HashMap<String, usize>, base: &str) -> String {
    if !taken.contains_key(base) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if !taken.contains_key(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn resolve_http_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| OpenApiToolsError::OpenApi(format!("Unsupported HTTP method '{method}': {e}")))
}

fn query_pair(key: &str, value: &Value) -> String {
    format!(
        "{}={}",
        encode_component(key),
        encode_component(&value_to_string(value))
    )
}

/// Percent-encode everything except RFC 3986 unreserved characters.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

/// Convert a JSON value to a string for URL parameters.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
