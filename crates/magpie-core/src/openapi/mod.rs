//! Reader for the consumed subset of OpenAPI 3.0.
//!
//! Only the pieces the classifier needs are modeled: `paths` with their
//! per-method operations, parameters, request bodies, responses, and
//! `components.schemas` for single-level `$ref` resolution. Documents load
//! from YAML or JSON.

pub mod descriptor;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::InvalidDescriptor;

/// Errors raised while loading or interrogating an OpenAPI document.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unresolvable schema reference {reference:?} (expected #/components/schemas/<name>)")]
    UnknownRef { reference: String },

    #[error(transparent)]
    InvalidDescriptor(#[from] InvalidDescriptor),
}

/// Top-level document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub openapi: Option<String>,
    #[serde(default)]
    pub info: Option<Info>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    #[serde(default)]
    pub components: Option<Components>,
}

/// `info` block; carried for reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One entry under `paths`.
///
/// Operations are kept as a raw method-name map so that a document using an
/// unrecognized method key fails descriptor construction with
/// [`InvalidDescriptor`] instead of being silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameters shared by every operation on this path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Method name (lowercase in well-formed documents) to operation.
    #[serde(flatten)]
    pub operations: BTreeMap<String, Operation>,
}

/// A single operation (one method on one path).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default, rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,
}

/// A query/path/header parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,
    /// Location: `query`, `path`, `header`, or `cookie`.
    #[serde(default, rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

/// Request body with per-media-type schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

/// One media type entry under `content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

/// A response entry keyed by status code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

/// A schema node: either a `$ref` or an inline type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// `components` block; only `schemas` is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub schemas: BTreeMap<String, Schema>,
}

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

impl Document {
    /// Parse a document from YAML text. JSON is a subset of YAML, so this
    /// accepts JSON input as well.
    pub fn from_yaml(content: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a document from JSON text.
    pub fn from_json(content: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a document from disk, dispatching on the file extension
    /// (`.json` parses as JSON, anything else as YAML).
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Flatten `paths` into `(path, raw method, operation)` triples, in
    /// document (map) order.
    pub fn endpoints(&self) -> impl Iterator<Item = (&str, &str, &Operation)> {
        self.paths.iter().flat_map(|(path, item)| {
            item.operations
                .iter()
                .map(move |(method, op)| (path.as_str(), method.as_str(), op))
        })
    }

    /// Resolve a schema through at most one `$ref` hop into
    /// `components.schemas`. Inline schemas are returned as-is.
    pub fn resolve<'a>(&'a self, schema: &'a Schema) -> Result<&'a Schema, SpecError> {
        let Some(reference) = &schema.reference else {
            return Ok(schema);
        };

        let name = reference
            .strip_prefix(SCHEMA_REF_PREFIX)
            .ok_or_else(|| SpecError::UnknownRef {
                reference: reference.clone(),
            })?;

        self.components
            .as_ref()
            .and_then(|c| c.schemas.get(name))
            .ok_or_else(|| SpecError::UnknownRef {
                reference: reference.clone(),
            })
    }
}
