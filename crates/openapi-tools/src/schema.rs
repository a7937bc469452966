//! `OpenAPI` schema -> tool input schema (JSON Schema subset) conversion.

use crate::resolver::ComponentResolver;
use crate::spec::{ApiOperation, ApiRequestBody, ParamLocation};
use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::collections::HashSet;

/// Keywords carried over verbatim from the source schema, in output order.
const COPIED_KEYWORDS: &[&str] = &[
    "enum",
    "format",
    "default",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
];

/// A schema position: either a `$ref` still to be followed or an inline schema.
#[derive(Debug, Clone, Copy)]
pub enum SchemaNode<'a> {
    Ref(&'a str),
    Inline(&'a Schema),
}

impl<'a> From<&'a ReferenceOr<Schema>> for SchemaNode<'a> {
    fn from(value: &'a ReferenceOr<Schema>) -> Self {
        match value {
            ReferenceOr::Reference { reference } => SchemaNode::Ref(reference),
            ReferenceOr::Item(schema) => SchemaNode::Inline(schema),
        }
    }
}

impl<'a> From<&'a ReferenceOr<Box<Schema>>> for SchemaNode<'a> {
    fn from(value: &'a ReferenceOr<Box<Schema>>) -> Self {
        match value {
            ReferenceOr::Reference { reference } => SchemaNode::Ref(reference),
            ReferenceOr::Item(schema) => SchemaNode::Inline(schema),
        }
    }
}

/// Recursive converter.
///
/// `visited` collects every component expanded by this converter and never shrinks, so each
/// component is expanded at most once per converter; a later reference to it (cyclic or
/// shared) yields a `circular reference` stub. Use a fresh converter per top-level schema.
pub struct SchemaConverter<'a> {
    resolver: ComponentResolver<'a>,
    visited: HashSet<String>,
}

impl<'a> SchemaConverter<'a> {
    #[must_use]
    pub fn new(resolver: ComponentResolver<'a>) -> Self {
        Self {
            resolver,
            visited: HashSet::new(),
        }
    }

    pub fn convert(&mut self, node: SchemaNode<'a>) -> Value {
        match node {
            SchemaNode::Inline(schema) => self.convert_schema(schema),
            SchemaNode::Ref(reference) => {
                let id = ComponentResolver::schema_id(reference);
                if self.visited.contains(&id) {
                    return circular_stub(&id);
                }
                let target = match self.resolver.schema_component(reference) {
                    Ok(target) => target,
                    Err(e) => {
                        tracing::debug!(%reference, error = %e, "leaving schema $ref unresolved");
                        return json!({ "$ref": reference });
                    }
                };
                self.visited.insert(id);
                self.convert(SchemaNode::from(target))
            }
        }
    }

    fn convert_schema(&mut self, schema: &'a Schema) -> Value {
        let mut out = JsonObject::new();

        if let Some(ty) = schema_type(schema) {
            out.insert("type".to_string(), Value::String(json_type(Some(ty)).to_string()));
        }
        if let Some(description) = schema.schema_data.description.as_deref()
            && !description.is_empty()
        {
            out.insert("description".to_string(), Value::String(description.to_string()));
        }

        match &schema.schema_kind {
            SchemaKind::Type(Type::Object(obj)) => {
                self.insert_properties(&mut out, obj.properties.iter(), &obj.required);
            }
            SchemaKind::Type(Type::Array(arr)) => {
                if let Some(items) = &arr.items {
                    let items = self.convert(SchemaNode::from(items));
                    out.insert("items".to_string(), items);
                }
            }
            SchemaKind::Any(any) => match any.typ.as_deref() {
                Some("object") | None if !any.properties.is_empty() => {
                    self.insert_properties(&mut out, any.properties.iter(), &any.required);
                }
                Some("array") => {
                    if let Some(items) = &any.items {
                        let items = self.convert(SchemaNode::from(items));
                        out.insert("items".to_string(), items);
                    }
                }
                _ => {}
            },
            _ => {}
        }

        copy_keywords(schema, &mut out);
        Value::Object(out)
    }

    fn insert_properties<I>(&mut self, out: &mut JsonObject, properties: I, required: &[String])
    where
        I: Iterator<Item = (&'a String, &'a ReferenceOr<Box<Schema>>)>,
    {
        let mut converted = JsonObject::new();
        for (name, prop) in properties {
            converted.insert(name.clone(), self.convert(SchemaNode::from(prop)));
        }
        if converted.is_empty() {
            return;
        }
        out.insert("properties".to_string(), Value::Object(converted));
        if !required.is_empty() {
            out.insert("required".to_string(), json!(required));
        }
    }
}

fn circular_stub(id: &str) -> Value {
    json!({
        "type": "object",
        "description": format!("circular reference to {id}"),
    })
}

fn copy_keywords(schema: &Schema, out: &mut JsonObject) {
    let Ok(Value::Object(raw)) = serde_json::to_value(schema) else {
        return;
    };
    for &key in COPIED_KEYWORDS {
        let Some(value) = raw.get(key) else {
            continue;
        };
        let keep = match (key, value) {
            (_, Value::Null) => false,
            ("enum", Value::Array(values)) => !values.is_empty(),
            ("format", Value::String(s)) => !s.is_empty(),
            ("uniqueItems", Value::Bool(unique)) => *unique,
            _ => true,
        };
        if keep {
            out.insert(key.to_string(), value.clone());
        }
    }
}

/// The declared `type` of a schema, if any.
#[must_use]
pub fn schema_type(schema: &Schema) -> Option<&str> {
    match &schema.schema_kind {
        SchemaKind::Type(Type::String(_)) => Some("string"),
        SchemaKind::Type(Type::Number(_)) => Some("number"),
        SchemaKind::Type(Type::Integer(_)) => Some("integer"),
        SchemaKind::Type(Type::Boolean(_)) => Some("boolean"),
        SchemaKind::Type(Type::Object(_)) => Some("object"),
        SchemaKind::Type(Type::Array(_)) => Some("array"),
        SchemaKind::Any(any) => any.typ.as_deref(),
        _ => None,
    }
}

/// Map an `OpenAPI` type onto the small set of tool schema types.
///
/// `integer` becomes `number`; anything unrecognised (including `number` and a missing type)
/// becomes `string`.
#[must_use]
pub fn json_type(openapi_type: Option<&str>) -> &'static str {
    match openapi_type {
        Some("integer") => "number",
        Some("boolean") => "boolean",
        Some("array") => "array",
        Some("object") => "object",
        _ => "string",
    }
}

/// Build the tool input schema for an operation.
///
/// Path and query parameters become top-level properties. An object request body with
/// declared properties is flattened into the top level; any other body is exposed as a single
/// `body` property.
#[must_use]
pub fn build_input_schema(resolver: ComponentResolver<'_>, op: &ApiOperation) -> JsonObject {
    let mut properties = JsonObject::new();
    let mut required: Vec<String> = Vec::new();

    for param in &op.parameters {
        if !matches!(param.location, ParamLocation::Path | ParamLocation::Query) {
            continue;
        }
        let ty = param
            .schema
            .as_ref()
            .and_then(|s| resolver.resolve_schema(s).ok())
            .and_then(schema_type);
        let description = param
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("{} parameter", param.name));
        properties.insert(
            param.name.clone(),
            json!({ "type": json_type(ty), "description": description }),
        );
        if param.required {
            mark_required(&param.name, &mut required);
        }
    }

    if let Some(body) = &op.request_body {
        match flattenable_body(resolver, body) {
            Some((body_props, body_required)) => {
                for (name, prop) in body_props {
                    let converted = SchemaConverter::new(resolver).convert(SchemaNode::from(prop));
                    properties.insert(name.clone(), converted);
                    if body.required && body_required.contains(name) {
                        mark_required(name, &mut required);
                    }
                }
            }
            None => {
                let fallback = body
                    .description
                    .clone()
                    .unwrap_or_else(|| "Request body".to_string());
                let body_schema = match &body.schema {
                    Some(schema) => {
                        let mut converted =
                            SchemaConverter::new(resolver).convert(SchemaNode::from(schema));
                        if let Value::Object(map) = &mut converted
                            && !map.contains_key("description")
                        {
                            map.insert("description".to_string(), Value::String(fallback));
                        }
                        converted
                    }
                    None => json!({ "type": "object", "description": fallback }),
                };
                properties.insert("body".to_string(), body_schema);
                if body.required {
                    mark_required("body", &mut required);
                }
            }
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    if !properties.is_empty() {
        schema.insert("properties".to_string(), Value::Object(properties));
    }
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}

fn mark_required(name: &str, required: &mut Vec<String>) {
    if !required.iter().any(|r| r == name) {
        required.push(name.to_string());
    }
}

type BodyProperties<'a> = (
    Vec<(&'a String, &'a ReferenceOr<Box<Schema>>)>,
    &'a [String],
);

/// The body's properties when it is an object (explicitly, or untyped with properties) that
/// declares at least one property.
fn flattenable_body<'a>(
    resolver: ComponentResolver<'a>,
    body: &'a ApiRequestBody,
) -> Option<BodyProperties<'a>> {
    let schema = resolver.resolve_schema(body.schema.as_ref()?).ok()?;
    let (properties, required) = match &schema.schema_kind {
        SchemaKind::Type(Type::Object(obj)) => (&obj.properties, obj.required.as_slice()),
        SchemaKind::Any(any) if matches!(any.typ.as_deref(), None | Some("object")) => {
            (&any.properties, any.required.as_slice())
        }
        _ => return None,
    };
    if properties.is_empty() {
        return None;
    }
    Some((properties.iter().collect(), required))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecDocument;

    fn doc(yaml: &str) -> SpecDocument {
        SpecDocument::parse("http://127.0.0.1:1/openapi.yaml", yaml).expect("parse")
    }

    fn input_schema(doc: &SpecDocument, index: usize) -> Value {
        Value::Object(build_input_schema(doc.resolver(), &doc.operations()[index]))
    }

    #[test]
    fn type_mapping() {
        assert_eq!(json_type(Some("integer")), "number");
        assert_eq!(json_type(Some("boolean")), "boolean");
        assert_eq!(json_type(Some("array")), "array");
        assert_eq!(json_type(Some("object")), "object");
        assert_eq!(json_type(Some("number")), "string");
        assert_eq!(json_type(None), "string");
    }

    #[test]
    fn parameters_become_properties() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /pets/{id}:
    get:
      responses: { "200": { description: ok } }
      parameters:
        - { name: id, in: path, required: true, schema: { type: integer } }
        - { name: q, in: query, description: Search text, schema: { type: string } }
        - { name: X-Req, in: header, schema: { type: string } }
"#);
        assert_eq!(
            input_schema(&doc, 0),
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "number", "description": "id parameter" },
                    "q": { "type": "string", "description": "Search text" }
                },
                "required": ["id"]
            })
        );
    }

    #[test]
    fn object_body_is_flattened() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /pets:
    post:
      responses: { "200": { description: ok } }
      requestBody:
        required: true
        content:
          application/json:
            schema: { $ref: '#/components/schemas/NewPet' }
components:
  schemas:
    NewPet:
      required: [name]
      properties:
        name: { type: string, minLength: 1 }
        age: { type: integer, minimum: 0 }
        tags:
          type: array
          items: { type: string, enum: [a, b] }
          uniqueItems: true
"#);
        assert_eq!(
            input_schema(&doc, 0),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "age": { "type": "number", "minimum": 0 },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["a", "b"] },
                        "uniqueItems": true
                    }
                },
                "required": ["name"]
            })
        );
    }

    #[test]
    fn optional_body_properties_are_never_required() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /pets:
    put:
      responses: { "200": { description: ok } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties: { name: { type: string } }
"#);
        let schema = input_schema(&doc, 0);
        assert!(schema.get("required").is_none());
        assert!(schema["properties"].get("name").is_some());
    }

    #[test]
    fn scalar_and_missing_bodies_use_body_property() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /notes:
    post:
      responses: { "200": { description: ok } }
      requestBody:
        required: true
        description: Note text
        content:
          text/plain:
            schema: { type: string }
    put:
      responses: { "200": { description: ok } }
      requestBody:
        content:
          application/octet-stream: {}
  /empty:
    get: { responses: { "200": { description: ok } } }
"#);
        assert_eq!(
            input_schema(&doc, 1),
            json!({
                "type": "object",
                "properties": { "body": { "type": "string", "description": "Note text" } },
                "required": ["body"]
            })
        );
        assert_eq!(
            input_schema(&doc, 0),
            json!({
                "type": "object",
                "properties": { "body": { "type": "object", "description": "Request body" } }
            })
        );
        assert_eq!(input_schema(&doc, 2), json!({ "type": "object" }));
    }

    #[test]
    fn self_referencing_schema_terminates_with_stub() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /nodes:
    post:
      responses: { "200": { description: ok } }
      requestBody:
        content:
          application/json:
            schema:
              type: array
              items: { $ref: '#/components/schemas/Node' }
components:
  schemas:
    Node:
      type: object
      properties:
        value: { type: string }
        next: { $ref: '#/components/schemas/Node' }
"#);
        let schema = input_schema(&doc, 0);
        let node = &schema["properties"]["body"]["items"];
        assert_eq!(node["type"], "object");
        assert_eq!(
            node["properties"]["next"],
            json!({ "type": "object", "description": "circular reference to Node" })
        );
    }

    #[test]
    fn each_flattened_body_property_gets_its_own_expansion() {
        let doc = doc(r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /orders:
    post:
      responses: { "200": { description: ok } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                billing: { $ref: '#/components/schemas/Address' }
                shipping: { $ref: '#/components/schemas/Address' }
                other: { $ref: '#/components/schemas/Missing' }
components:
  schemas:
    Address:
      type: object
      properties: { city: { type: string, format: city-name } }
"#);
        let schema = input_schema(&doc, 0);
        let expected = json!({
            "type": "object",
            "properties": { "city": { "type": "string", "format": "city-name" } }
        });
        assert_eq!(schema["properties"]["billing"], expected);
        assert_eq!(schema["properties"]["shipping"], expected);
        assert_eq!(
            schema["properties"]["other"],
            json!({ "$ref": "#/components/schemas/Missing" })
        );
    }

    #[test]
    fn shared_references_are_expanded_once_per_property() {
        const DEPTH: usize = 20;
        let mut components = String::new();
        for i in 0..DEPTH {
            let next = i + 1;
            components.push_str(&format!(
                "    S{i}:\n      type: object\n      properties:\n        \
                 a: {{ $ref: '#/components/schemas/S{next}' }}\n        \
                 b: {{ $ref: '#/components/schemas/S{next}' }}\n"
            ));
        }
        components.push_str(&format!("    S{DEPTH}: {{ type: string }}\n"));
        let doc = doc(&format!(
            r#"
openapi: "3.0.0"
info: {{ title: t, version: "1" }}
paths:
  /graph:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema: {{ $ref: '#/components/schemas/S0' }}
      responses: {{ "200": {{ description: ok }} }}
components:
  schemas:
{components}"#
        ));

        let schema = input_schema(&doc, 0);
        let encoded = serde_json::to_string(&schema).expect("encode");
        assert!(encoded.len() < 20_000, "schema grew to {} bytes", encoded.len());

        let a = &schema["properties"]["a"];
        assert_eq!(a, &schema["properties"]["b"]);
        assert_eq!(a["properties"]["a"]["type"], "object");
        assert_eq!(
            a["properties"]["b"],
            json!({ "type": "object", "description": "circular reference to S2" })
        );
    }
}
