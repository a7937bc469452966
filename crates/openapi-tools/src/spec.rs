//! Loading an `OpenAPI` document and flattening it into a list of operations.

use crate::config::ToolSourceConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::ComponentResolver;
use openapiv3::{
    MediaType, OpenAPI, Operation, Parameter, ParameterData, ParameterSchemaOrContent, PathItem,
    ReferenceOr, RequestBody, Schema, Server,
};
use reqwest::Client;
use std::collections::HashMap;
use unrelated_http_tools::safety::{origin_url, redact_url, sanitize_reqwest_error};
use url::Url;

/// Where a parameter is sent. Only `Path` and `Query` take part in tool schemas and request
/// synthesis; header and cookie parameters are kept for completeness and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

#[derive(Debug, Clone)]
pub struct ApiParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    pub schema: Option<ReferenceOr<Schema>>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiRequestBody {
    pub description: Option<String>,
    pub required: bool,
    /// Schema of the selected media type (`application/json` when declared).
    pub schema: Option<ReferenceOr<Schema>>,
}

/// One `(path, method)` pair of the document, with parameters and request body already
/// resolved through local `$ref`s.
#[derive(Debug, Clone)]
pub struct ApiOperation {
    /// Lowercase HTTP method (`get`, `post`, ...).
    pub method: String,
    /// Path template as written in the document (e.g. `/pets/{id}`).
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<ApiParameter>,
    pub request_body: Option<ApiRequestBody>,
}

impl ApiOperation {
    #[must_use]
    pub fn is_query_parameter(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|p| p.location == ParamLocation::Query && p.name == name)
    }
}

/// A parsed `OpenAPI` document together with its resolved base URL.
///
/// Immutable once loaded; tool generation and request preparation only ever read it.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    base_url: String,
    spec: OpenAPI,
    operations: Vec<ApiOperation>,
}

impl SpecDocument {
    /// Fetch and parse the spec named by `config.spec_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the fetch fails or returns a non-2xx status,
    /// or the body is not a usable `OpenAPI` 3 document.
    pub async fn load(config: &ToolSourceConfig, client: &Client) -> Result<Self> {
        let url =
            Url::parse(&config.spec_url).map_err(|source| OpenApiToolsError::InvalidSpecUrl {
                url: config.spec_url.clone(),
                source,
            })?;
        tracing::info!(url = %redact_url(&url), "fetching OpenAPI spec");

        let resp = client
            .get(url.clone())
            .timeout(config.spec_timeout)
            .send()
            .await
            .map_err(|e| OpenApiToolsError::SpecFetch {
                url: redact_url(&url),
                message: sanitize_reqwest_error(&e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OpenApiToolsError::SpecStatus {
                url: redact_url(&url),
                status: status.as_u16(),
            });
        }

        let content = resp
            .text()
            .await
            .map_err(|e| OpenApiToolsError::SpecReadBody {
                url: redact_url(&url),
                message: sanitize_reqwest_error(&e),
            })?;

        let doc = Self::parse(&config.spec_url, &content)?;
        tracing::info!(
            title = %doc.title(),
            base_url = %doc.base_url,
            operations = doc.operations.len(),
            "loaded OpenAPI spec"
        );
        Ok(doc)
    }

    /// Parse spec content that was obtained from `spec_url`.
    ///
    /// Content starting with `{` is parsed as JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the content does not parse, is not an `OpenAPI` 3.x document, or
    /// its first server URL cannot be resolved.
    pub fn parse(spec_url: &str, content: &str) -> Result<Self> {
        let parse_err = |message: String| OpenApiToolsError::SpecParse {
            location: spec_url.to_string(),
            message,
        };

        let spec: OpenAPI = if content.trim_start().starts_with('{') {
            serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?
        };

        if !spec.openapi.starts_with("3.") {
            return Err(parse_err(format!(
                "unsupported OpenAPI version '{}' (expected 3.x)",
                spec.openapi
            )));
        }

        let base_url = resolve_base_url(spec_url, spec.servers.first())?;
        let operations = collect_operations(&spec);

        Ok(Self {
            base_url,
            spec,
            operations,
        })
    }

    /// Base URL for downstream calls, without a trailing `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.spec.info.title
    }

    /// Operations in document order (paths as declared, methods in a fixed order per path).
    #[must_use]
    pub fn operations(&self) -> &[ApiOperation] {
        &self.operations
    }

    #[must_use]
    pub fn resolver(&self) -> ComponentResolver<'_> {
        ComponentResolver::new(&self.spec)
    }
}

/// Pick the downstream base URL: the first server (variables replaced by their defaults,
/// relative URLs joined onto the spec URL), else the origin of the spec URL.
fn resolve_base_url(spec_url: &str, server: Option<&Server>) -> Result<String> {
    let resolved = match server {
        Some(server) => {
            let raw = substitute_server_variables(server);
            if raw.starts_with("http://") || raw.starts_with("https://") {
                raw
            } else {
                let mut base =
                    Url::parse(spec_url).map_err(|source| OpenApiToolsError::InvalidSpecUrl {
                        url: spec_url.to_string(),
                        source,
                    })?;
                base.set_fragment(None);
                let relative = if raw.is_empty() { "/" } else { raw.as_str() };
                base.join(relative)
                    .map_err(|e| {
                        OpenApiToolsError::OpenApi(format!("Invalid server URL '{raw}': {e}"))
                    })?
                    .to_string()
            }
        }
        None => origin_url(spec_url).ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!(
                "cannot derive a base URL from spec URL '{spec_url}'"
            ))
        })?,
    };

    Ok(resolved.trim_end_matches('/').to_string())
}

fn substitute_server_variables(server: &Server) -> String {
    let mut url = server.url.clone();
    if let Some(variables) = &server.variables {
        for (name, variable) in variables {
            url = url.replace(&format!("{{{name}}}"), &variable.default);
        }
    }
    url
}

fn collect_operations(spec: &OpenAPI) -> Vec<ApiOperation> {
    let resolver = ComponentResolver::new(spec);
    let mut out = Vec::new();

    for (path, item) in &spec.paths.paths {
        let item = match item {
            ReferenceOr::Item(item) => item,
            ReferenceOr::Reference { reference } => {
                tracing::warn!(%path, %reference, "skipping path item $ref (not supported)");
                continue;
            }
        };

        for (method, op) in path_item_operations(item) {
            out.push(ApiOperation {
                method: method.to_string(),
                path: path.clone(),
                operation_id: op.operation_id.clone(),
                summary: op.summary.clone(),
                description: op.description.clone(),
                parameters: merge_parameters(resolver, path, &item.parameters, &op.parameters),
                request_body: op
                    .request_body
                    .as_ref()
                    .map(|body| request_body(resolver, path, body)),
            });
        }
    }

    out
}

fn path_item_operations(item: &PathItem) -> Vec<(&'static str, &Operation)> {
    [
        ("get", &item.get),
        ("put", &item.put),
        ("post", &item.post),
        ("delete", &item.delete),
        ("options", &item.options),
        ("head", &item.head),
        ("patch", &item.patch),
        ("trace", &item.trace),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    .collect()
}

/// Path-item parameters first, then operation parameters; an operation parameter replaces a
/// path-item parameter with the same name and location.
fn merge_parameters(
    resolver: ComponentResolver<'_>,
    path: &str,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Vec<ApiParameter> {
    let mut merged: Vec<ApiParameter> = Vec::new();
    let mut index: HashMap<(ParamLocation, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let resolved = match resolver.resolve_parameter(p) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(%path, error = %e, "skipping unresolvable parameter");
                continue;
            }
        };
        let param = api_parameter(resolved);
        let key = (param.location, param.name.clone());
        if let Some(&i) = index.get(&key) {
            merged[i] = param;
        } else {
            index.insert(key, merged.len());
            merged.push(param);
        }
    }

    merged
}

fn api_parameter(param: &Parameter) -> ApiParameter {
    let (data, location): (&ParameterData, ParamLocation) = match param {
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path),
        Parameter::Query { parameter_data, .. } => (parameter_data, ParamLocation::Query),
        Parameter::Header { parameter_data, .. } => (parameter_data, ParamLocation::Header),
        Parameter::Cookie { parameter_data, .. } => (parameter_data, ParamLocation::Cookie),
    };

    let schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema) => Some(schema.clone()),
        ParameterSchemaOrContent::Content(content) => {
            content.values().next().and_then(|m| m.schema.clone())
        }
    };

    ApiParameter {
        name: data.name.clone(),
        location,
        required: data.required,
        description: data.description.clone(),
        schema,
    }
}

fn request_body(
    resolver: ComponentResolver<'_>,
    path: &str,
    body: &ReferenceOr<RequestBody>,
) -> ApiRequestBody {
    let body = match resolver.resolve_request_body(body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(%path, error = %e, "request body could not be resolved");
            return ApiRequestBody::default();
        }
    };

    ApiRequestBody {
        description: body.description.clone(),
        required: body.required,
        schema: select_media_type(body).and_then(|m| m.schema.clone()),
    }
}

/// `application/json` when declared, otherwise the first JSON-ish media type, otherwise the
/// first one.
fn select_media_type(body: &RequestBody) -> Option<&MediaType> {
    body.content
        .get("application/json")
        .or_else(|| {
            body.content
                .iter()
                .find(|(k, _)| k.contains("json"))
                .map(|(_, v)| v)
        })
        .or_else(|| body.content.values().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r#"
openapi: "3.0.3"
info: { title: Petstore, version: "1" }
servers:
  - url: "{scheme}://api.example.com/{version}/"
    variables:
      scheme: { default: https }
      version: { default: v2 }
paths:
  /pets/{id}:
    parameters:
      - name: id
        in: path
        required: true
        schema: { type: string }
      - name: verbose
        in: query
        schema: { type: boolean }
    get:
      responses: { "200": { description: ok } }
      operationId: getPet
      parameters:
        - name: verbose
          in: query
          required: true
          description: overridden
          schema: { type: boolean }
        - $ref: '#/components/parameters/Trace'
    delete:
      responses: { "200": { description: ok } }
      summary: Delete a pet
  /pets:
    post:
      responses: { "200": { description: ok } }
      requestBody:
        $ref: '#/components/requestBodies/NewPet'
components:
  parameters:
    Trace:
      name: X-Trace
      in: header
      schema: { type: string }
  requestBodies:
    NewPet:
      required: true
      content:
        text/plain:
          schema: { type: string }
        application/json:
          schema: { type: object, properties: { name: { type: string } } }
"#;

    #[test]
    fn parses_yaml_and_resolves_server_variables() {
        let doc = SpecDocument::parse("https://specs.example.com/petstore.yaml", PETSTORE)
            .expect("parse");
        assert_eq!(doc.base_url(), "https://api.example.com/v2");
        assert_eq!(doc.title(), "Petstore");

        let ops: Vec<(&str, &str)> = doc
            .operations()
            .iter()
            .map(|o| (o.method.as_str(), o.path.as_str()))
            .collect();
        assert_eq!(
            ops,
            vec![("get", "/pets/{id}"), ("delete", "/pets/{id}"), ("post", "/pets")]
        );
    }

    #[test]
    fn merges_path_item_parameters_with_operation_override() {
        let doc = SpecDocument::parse("https://specs.example.com/petstore.yaml", PETSTORE)
            .expect("parse");
        let get = &doc.operations()[0];
        let names: Vec<(&str, ParamLocation)> = get
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.location))
            .collect();
        assert_eq!(
            names,
            vec![
                ("id", ParamLocation::Path),
                ("verbose", ParamLocation::Query),
                ("X-Trace", ParamLocation::Header),
            ]
        );
        let verbose = &get.parameters[1];
        assert!(verbose.required);
        assert_eq!(verbose.description.as_deref(), Some("overridden"));
        assert!(get.is_query_parameter("verbose"));
        assert!(!get.is_query_parameter("id"));

        // The delete operation only inherits the path-item parameters.
        assert_eq!(doc.operations()[1].parameters.len(), 2);
    }

    #[test]
    fn request_body_prefers_json_media_type() {
        let doc = SpecDocument::parse("https://specs.example.com/petstore.yaml", PETSTORE)
            .expect("parse");
        let body = doc.operations()[2]
            .request_body
            .as_ref()
            .expect("request body");
        assert!(body.required);
        let Some(ReferenceOr::Item(schema)) = &body.schema else {
            panic!("expected inline schema");
        };
        assert!(matches!(
            schema.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::Object(_))
        ));
    }

    #[test]
    fn parses_json_and_falls_back_to_spec_origin() {
        let content = r#"{"openapi":"3.0.0","info":{"title":"t","version":"1"},"paths":{}}"#;
        let doc = SpecDocument::parse("http://127.0.0.1:8080/docs/openapi.json", content)
            .expect("parse");
        assert_eq!(doc.base_url(), "http://127.0.0.1:8080");
        assert!(doc.operations().is_empty());
    }

    #[test]
    fn relative_server_url_is_joined_onto_spec_url() {
        let content = r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
servers: [ { url: /api/v3 } ]
paths: {}
"#;
        let doc = SpecDocument::parse("http://localhost:9000/openapi.yaml", content)
            .expect("parse");
        assert_eq!(doc.base_url(), "http://localhost:9000/api/v3");
    }

    #[test]
    fn rejects_malformed_and_non_v3_documents() {
        let err = SpecDocument::parse("http://h/x", "{not json").unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecParse { .. }));

        let swagger = r#"{"openapi":"2.0","info":{"title":"t","version":"1"},"paths":{}}"#;
        let err = SpecDocument::parse("http://h/x", swagger).unwrap_err();
        assert!(err.to_string().contains("unsupported OpenAPI version"));
    }
}
