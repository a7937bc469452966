//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not automatically resolve
//! them.
//! This resolver handles local component references only:
//! - `#/components/schemas/<Name>`
//! - `#/components/parameters/<Name>`
//! - `#/components/requestBodies/<Name>`
//!
//! Parameters and request bodies are followed through chains of references (with loop detection).
//! Schemas are resolved one hop at a time so the schema converter can track which component
//! types it is currently inside of and break reference cycles itself.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{Components, OpenAPI, Parameter, ReferenceOr, RequestBody, Schema};
use std::collections::HashSet;

const SCHEMAS: &str = "schemas";
const PARAMETERS: &str = "parameters";
const REQUEST_BODIES: &str = "requestBodies";

#[derive(Debug, Clone, Copy)]
pub struct ComponentResolver<'a> {
    spec: &'a OpenAPI,
}

impl<'a> ComponentResolver<'a> {
    #[must_use]
    pub fn new(spec: &'a OpenAPI) -> Self {
        Self { spec }
    }

    /// Resolve a parameter, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is not a local component reference, points at a
    /// missing component, or loops back on itself.
    pub fn resolve_parameter(&self, param: &'a ReferenceOr<Parameter>) -> Result<&'a Parameter> {
        self.follow(param, PARAMETERS, |c, name| c.parameters.get(name))
    }

    /// Resolve a request body, following `$ref` chains.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::resolve_parameter`].
    pub fn resolve_request_body(
        &self,
        body: &'a ReferenceOr<RequestBody>,
    ) -> Result<&'a RequestBody> {
        self.follow(body, REQUEST_BODIES, |c, name| c.request_bodies.get(name))
    }

    /// Resolve a schema all the way down to an inline schema.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::resolve_parameter`].
    pub fn resolve_schema(&self, schema: &'a ReferenceOr<Schema>) -> Result<&'a Schema> {
        self.follow(schema, SCHEMAS, |c, name| c.schemas.get(name))
    }

    /// Look up the component a schema `$ref` points at, without following further references.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is not a local schema reference or the component is
    /// missing.
    pub fn schema_component(&self, reference: &str) -> Result<&'a ReferenceOr<Schema>> {
        let name = component_name(reference, SCHEMAS).ok_or_else(|| unsupported(reference))?;
        self.components()
            .and_then(|c| c.schemas.get(&name))
            .ok_or_else(|| unresolved(reference))
    }

    /// The identifier of the type a schema `$ref` names (the component name for local refs,
    /// the raw reference otherwise).
    #[must_use]
    pub fn schema_id(reference: &str) -> String {
        component_name(reference, SCHEMAS).unwrap_or_else(|| reference.to_string())
    }

    fn components(&self) -> Option<&'a Components> {
        self.spec.components.as_ref()
    }

    fn follow<T>(
        &self,
        start: &'a ReferenceOr<T>,
        section: &str,
        lookup: impl Fn(&'a Components, &str) -> Option<&'a ReferenceOr<T>>,
    ) -> Result<&'a T> {
        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut cur = start;

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.as_str()) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }
                    let name =
                        component_name(reference, section).ok_or_else(|| unsupported(reference))?;
                    cur = self
                        .components()
                        .and_then(|c| lookup(c, &name))
                        .ok_or_else(|| unresolved(reference))?;
                }
            }
        }
    }
}

/// Extract `<Name>` from `#/components/<section>/<Name>`, undoing JSON pointer escaping.
fn component_name(reference: &str, section: &str) -> Option<String> {
    let rest = reference
        .strip_prefix("#/components/")?
        .strip_prefix(section)?
        .strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest.replace("~1", "/").replace("~0", "~"))
}

fn unsupported(reference: &str) -> OpenApiToolsError {
    OpenApiToolsError::OpenApi(format!(
        "Unsupported $ref '{reference}' (only local #/components references are resolved)",
    ))
}

fn unresolved(reference: &str) -> OpenApiToolsError {
    OpenApiToolsError::OpenApi(format!("Unresolved $ref '{reference}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> OpenAPI {
        serde_yaml::from_str(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths: {}
components:
  schemas:
    Pet:
      type: object
      properties:
        name: { type: string }
    PetAlias:
      $ref: '#/components/schemas/Pet'
    Loop:
      $ref: '#/components/schemas/Loop'
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer }
    LimitAlias:
      $ref: '#/components/parameters/Limit'
  requestBodies:
    PetBody:
      required: true
      content:
        application/json:
          schema:
            $ref: '#/components/schemas/Pet'
"#,
        )
        .expect("valid spec")
    }

    #[test]
    fn component_name_handles_pointer_escapes() {
        assert_eq!(
            component_name("#/components/schemas/a~1b~0c", "schemas").as_deref(),
            Some("a/b~c")
        );
        assert_eq!(component_name("#/components/schemas/", "schemas"), None);
        assert_eq!(component_name("other.yaml#/components/schemas/X", "schemas"), None);
        assert_eq!(component_name("#/components/parameters/X", "schemas"), None);
    }

    #[test]
    fn follows_parameter_ref_chains() {
        let spec = spec();
        let resolver = ComponentResolver::new(&spec);
        let r = ReferenceOr::Reference {
            reference: "#/components/parameters/LimitAlias".to_string(),
        };
        match resolver.resolve_parameter(&r).expect("resolves") {
            Parameter::Query { parameter_data, .. } => assert_eq!(parameter_data.name, "limit"),
            other => panic!("expected a query parameter, got {other:?}"),
        }
    }

    #[test]
    fn resolves_request_body_and_schema_alias() {
        let spec = spec();
        let resolver = ComponentResolver::new(&spec);
        let body_ref = ReferenceOr::Reference {
            reference: "#/components/requestBodies/PetBody".to_string(),
        };
        let body = resolver.resolve_request_body(&body_ref).expect("body");
        assert!(body.required);

        let alias = resolver
            .schema_component("#/components/schemas/PetAlias")
            .expect("alias component");
        let pet = resolver.resolve_schema(alias).expect("alias resolves");
        assert!(matches!(
            pet.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::Object(_))
        ));
    }

    #[test]
    fn detects_self_referencing_alias() {
        let spec = spec();
        let resolver = ComponentResolver::new(&spec);
        let looped = resolver
            .schema_component("#/components/schemas/Loop")
            .expect("component exists");
        let err = resolver.resolve_schema(looped).unwrap_err();
        assert!(err.to_string().contains("Cyclic"));
    }

    #[test]
    fn missing_components_are_errors() {
        let spec = spec();
        let resolver = ComponentResolver::new(&spec);
        assert!(resolver.schema_component("#/components/schemas/Nope").is_err());
        assert!(resolver
            .schema_component("https://example.com/x.yaml#/components/schemas/Pet")
            .is_err());
        assert_eq!(ComponentResolver::schema_id("#/components/schemas/Pet"), "Pet");
    }
}
