//! Derivation of [`EndpointDescriptor`]s from a parsed document.
//!
//! Each operation is reduced to the handful of boolean properties the
//! classifier consumes: response shape, pagination markers, and request
//! body fields.

use std::collections::BTreeSet;

use crate::classify::EndpointDescriptor;

use super::{Document, Operation, PathItem, Response, Schema, SpecError};

/// Query parameter names treated as pagination markers.
const PAGINATION_PARAMS: &[&str] = &["page", "per_page", "limit", "offset", "cursor"];

/// Wrapper-object property names treated as pagination markers.
const PAGINATION_WRAPPER_KEYS: &[&str] = &["total", "next", "cursor"];

/// Wrapper-object property names that may hold the item collection.
const COLLECTION_KEYS: &[&str] = &["data", "items", "results"];

impl Document {
    /// Derive a descriptor for every operation in the document, in path
    /// order. Fails on the first operation with an unrecognized method or
    /// an unresolvable schema reference.
    pub fn descriptors(&self) -> Result<Vec<EndpointDescriptor>, SpecError> {
        let mut out = Vec::new();
        for (path, item) in &self.paths {
            for (method, op) in &item.operations {
                out.push(self.descriptor_for(path, item, method, op)?);
            }
        }
        Ok(out)
    }

    /// Derive the descriptor for a single operation.
    pub fn descriptor_for(
        &self,
        path: &str,
        item: &PathItem,
        raw_method: &str,
        op: &Operation,
    ) -> Result<EndpointDescriptor, SpecError> {
        let shape = self.response_shape(op)?;
        let is_array_response = shape.is_some();

        let has_query_marker = item
            .parameters
            .iter()
            .chain(op.parameters.iter())
            .any(|p| p.location == "query" && PAGINATION_PARAMS.contains(&p.name.as_str()));
        let has_wrapper_marker = match &shape {
            Some(ResponseShape::Wrapped { wrapper }) => PAGINATION_WRAPPER_KEYS
                .iter()
                .any(|key| wrapper.properties.contains_key(*key)),
            _ => false,
        };
        let is_paginated = is_array_response && (has_query_marker || has_wrapper_marker);

        let body_fields = self.body_fields(op)?;
        let has_body = op.request_body.is_some();

        let descriptor = EndpointDescriptor::new(
            path,
            op.operation_id.clone(),
            Some(raw_method),
            is_array_response,
            is_paginated,
            has_body,
            body_fields,
        )?;
        Ok(descriptor)
    }

    /// Classify the success response as a plain array, an object wrapping
    /// an array under a well-known key, or neither.
    fn response_shape(&self, op: &Operation) -> Result<Option<ResponseShape>, SpecError> {
        let Some(schema) = success_schema(op) else {
            return Ok(None);
        };
        let resolved = self.resolve(schema)?;

        match resolved.schema_type.as_deref() {
            Some("array") => Ok(Some(ResponseShape::Plain)),
            Some("object") | None if !resolved.properties.is_empty() => {
                for key in COLLECTION_KEYS {
                    if let Some(prop) = resolved.properties.get(*key) {
                        let prop = self.resolve(prop)?;
                        if prop.schema_type.as_deref() == Some("array") {
                            return Ok(Some(ResponseShape::Wrapped {
                                wrapper: resolved.clone(),
                            }));
                        }
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Top-level property names of the request body schema. A property
    /// with `format: binary` contributes the synthetic field name `file`.
    fn body_fields(&self, op: &Operation) -> Result<BTreeSet<String>, SpecError> {
        let Some(body) = &op.request_body else {
            return Ok(BTreeSet::new());
        };
        let Some(schema) = body_schema(body) else {
            return Ok(BTreeSet::new());
        };
        let resolved = self.resolve(schema)?;

        let mut fields = BTreeSet::new();
        for (name, prop) in &resolved.properties {
            fields.insert(name.clone());
            let prop = self.resolve(prop)?;
            if prop.format.as_deref() == Some("binary") {
                fields.insert("file".to_string());
            }
        }
        Ok(fields)
    }
}

enum ResponseShape {
    /// The success response is itself an array.
    Plain,
    /// The success response is an object carrying an array under a
    /// collection key; the wrapper is kept for pagination-marker checks.
    Wrapped { wrapper: Schema },
}

/// The schema of the lowest 2xx response, preferring `application/json`
/// over other media types.
fn success_schema(op: &Operation) -> Option<&Schema> {
    let (_, response) = op
        .responses
        .iter()
        .filter(|(code, _)| code.starts_with('2'))
        .min_by(|(a, _), (b, _)| a.cmp(b))?;
    content_schema(response)
}

fn content_schema(response: &Response) -> Option<&Schema> {
    response
        .content
        .get("application/json")
        .or_else(|| response.content.values().next())?
        .schema
        .as_ref()
}

fn body_schema(body: &super::RequestBody) -> Option<&Schema> {
    body.content
        .get("application/json")
        .or_else(|| body.content.get("multipart/form-data"))
        .or_else(|| body.content.values().next())?
        .schema
        .as_ref()
}

#[cfg(test)]
mod tests {
    use crate::classify::{classify, HttpMethod, UiPattern};
    use crate::openapi::Document;

    const PETSTORE: &str = r##"
openapi: "3.0.3"
info:
  title: Petstore
  version: "1.0"
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
      responses:
        "200":
          description: paged pets
          content:
            application/json:
              schema:
                type: array
                items:
                  $ref: "#/components/schemas/Pet"
    post:
      operationId: createPet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/NewPet"
      responses:
        "201":
          description: created
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
    get:
      operationId: getPet
      responses:
        "200":
          description: one pet
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Pet"
    delete:
      operationId: deletePet
      responses:
        "204":
          description: gone
  /pets/{petId}/photo:
    post:
      operationId: uploadPhoto
      requestBody:
        content:
          multipart/form-data:
            schema:
              type: object
              properties:
                caption:
                  type: string
                photo:
                  type: string
                  format: binary
      responses:
        "200":
          description: stored
  /tags:
    get:
      operationId: listTags
      responses:
        "200":
          description: all tags
          content:
            application/json:
              schema:
                type: array
                items:
                  type: string
components:
  schemas:
    Pet:
      type: object
      properties:
        id:
          type: integer
        name:
          type: string
    NewPet:
      type: object
      required: [name]
      properties:
        name:
          type: string
        tag:
          type: string
"##;

    fn petstore() -> Document {
        Document::from_yaml(PETSTORE).expect("fixture should parse")
    }

    fn descriptor_for(doc: &Document, operation_id: &str) -> crate::classify::EndpointDescriptor {
        doc.descriptors()
            .expect("derivation should succeed")
            .into_iter()
            .find(|d| d.operation_id.as_deref() == Some(operation_id))
            .unwrap_or_else(|| panic!("no operation {operation_id}"))
    }

    #[test]
    fn list_with_limit_param_is_paginated() {
        let doc = petstore();
        let d = descriptor_for(&doc, "listPets");
        assert_eq!(d.method, HttpMethod::Get);
        assert!(d.is_array_response);
        assert!(d.is_paginated);
        assert_eq!(classify(&d), UiPattern::PaginatedList);
    }

    #[test]
    fn bare_array_without_markers_is_simple_list() {
        let doc = petstore();
        let d = descriptor_for(&doc, "listTags");
        assert!(d.is_array_response);
        assert!(!d.is_paginated);
        assert_eq!(classify(&d), UiPattern::SimpleList);
    }

    #[test]
    fn single_object_get_is_detail_view() {
        let doc = petstore();
        let d = descriptor_for(&doc, "getPet");
        assert!(!d.is_array_response);
        assert_eq!(classify(&d), UiPattern::DetailView);
    }

    #[test]
    fn post_with_ref_body_is_create_form() {
        let doc = petstore();
        let d = descriptor_for(&doc, "createPet");
        assert!(d.has_body);
        assert_eq!(
            d.body_fields.iter().cloned().collect::<Vec<_>>(),
            vec!["name".to_string(), "tag".to_string()]
        );
        assert_eq!(classify(&d), UiPattern::CreateForm);
    }

    #[test]
    fn binary_body_field_marks_file_upload() {
        let doc = petstore();
        let d = descriptor_for(&doc, "uploadPhoto");
        assert!(d.body_fields.contains("file"));
        assert!(d.body_fields.contains("photo"));
        assert_eq!(classify(&d), UiPattern::FileUpload);
    }

    #[test]
    fn delete_is_delete_confirmation() {
        let doc = petstore();
        let d = descriptor_for(&doc, "deletePet");
        assert_eq!(classify(&d), UiPattern::DeleteConfirmation);
    }

    #[test]
    fn wrapped_collection_with_total_is_paginated() {
        let doc = Document::from_yaml(
            r#"
paths:
  /users:
    get:
      operationId: listUsers
      responses:
        "200":
          description: users page
          content:
            application/json:
              schema:
                type: object
                properties:
                  data:
                    type: array
                    items:
                      type: object
                  total:
                    type: integer
"#,
        )
        .unwrap();
        let d = descriptor_for(&doc, "listUsers");
        assert!(d.is_array_response);
        assert!(d.is_paginated);
    }

    #[test]
    fn wrapped_collection_without_markers_is_simple_list() {
        let doc = Document::from_yaml(
            r#"
paths:
  /groups:
    get:
      operationId: listGroups
      responses:
        "200":
          description: all groups
          content:
            application/json:
              schema:
                type: object
                properties:
                  items:
                    type: array
                    items:
                      type: string
"#,
        )
        .unwrap();
        let d = descriptor_for(&doc, "listGroups");
        assert!(d.is_array_response);
        assert!(!d.is_paginated);
        assert_eq!(classify(&d), UiPattern::SimpleList);
    }

    #[test]
    fn unknown_method_key_fails_derivation() {
        let doc = Document::from_yaml(
            r#"
paths:
  /odd:
    frobnicate:
      operationId: oddOne
      responses: {}
"#,
        )
        .unwrap();
        assert!(doc.descriptors().is_err());
    }

    #[test]
    fn dangling_ref_fails_derivation() {
        let doc = Document::from_yaml(
            r##"
paths:
  /broken:
    get:
      responses:
        "200":
          description: broken
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Nope"
"##,
        )
        .unwrap();
        assert!(doc.descriptors().is_err());
    }
}
