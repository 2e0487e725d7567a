//! Endpoint-to-UI-pattern classification.
//!
//! Given a structural summary of one API operation (method, response shape,
//! body fields), decide which category of user-interface component should
//! represent it. The decision procedure is ordered, first match wins, and is
//! total over well-formed descriptors.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a descriptor cannot be built from its raw parts.
///
/// Malformed input fails immediately rather than being classified by guess.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidDescriptor {
    #[error("operation {path:?} has no HTTP method")]
    MissingMethod { path: String },

    #[error("unrecognized HTTP method {value:?} on {path:?}")]
    UnknownMethod { path: String, value: String },
}

/// HTTP method of an operation.
///
/// All standard methods parse; methods outside the mapped set (OPTIONS,
/// HEAD, TRACE) are well-formed input that classifies as [`UiPattern::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Trace,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Trace => "TRACE",
        };
        f.write_str(s)
    }
}

impl FromStr for HttpMethod {
    type Err = HttpMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            "HEAD" => Ok(Self::Head),
            "TRACE" => Ok(Self::Trace),
            other => Err(HttpMethodParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`HttpMethod`] string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMethodParseError(pub String);

impl fmt::Display for HttpMethodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid HTTP method: {:?}", self.0)
    }
}

impl std::error::Error for HttpMethodParseError {}

/// The UI pattern category an endpoint maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiPattern {
    PaginatedList,
    SimpleList,
    DetailView,
    FileUpload,
    CreateForm,
    EditForm,
    DeleteConfirmation,
    Custom,
}

impl fmt::Display for UiPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PaginatedList => "paginated_list",
            Self::SimpleList => "simple_list",
            Self::DetailView => "detail_view",
            Self::FileUpload => "file_upload",
            Self::CreateForm => "create_form",
            Self::EditForm => "edit_form",
            Self::DeleteConfirmation => "delete_confirmation",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for UiPattern {
    type Err = UiPatternParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paginated_list" => Ok(Self::PaginatedList),
            "simple_list" => Ok(Self::SimpleList),
            "detail_view" => Ok(Self::DetailView),
            "file_upload" => Ok(Self::FileUpload),
            "create_form" => Ok(Self::CreateForm),
            "edit_form" => Ok(Self::EditForm),
            "delete_confirmation" => Ok(Self::DeleteConfirmation),
            "custom" => Ok(Self::Custom),
            other => Err(UiPatternParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`UiPattern`] string.
#[derive(Debug, Clone)]
pub struct UiPatternParseError(pub String);

impl fmt::Display for UiPatternParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ui pattern: {:?}", self.0)
    }
}

impl std::error::Error for UiPatternParseError {}

/// Structural summary of one API operation, the classifier's input.
///
/// Immutable once constructed; built from a parsed OpenAPI fragment by
/// [`crate::openapi::Document::descriptor_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Route template, e.g. `/users/{id}`. Carried for reporting only.
    pub path: String,
    /// Operation id when the source document declares one.
    pub operation_id: Option<String>,
    pub method: HttpMethod,
    /// The success response is an array (possibly behind a wrapper object).
    pub is_array_response: bool,
    /// The array response carries pagination markers.
    pub is_paginated: bool,
    /// The operation declares a request body.
    pub has_body: bool,
    /// Top-level property names of the request body schema.
    pub body_fields: BTreeSet<String>,
}

impl EndpointDescriptor {
    /// Build a descriptor, validating the raw method string.
    ///
    /// A missing or unrecognized method is an [`InvalidDescriptor`]; it is
    /// never silently mapped to `Custom`.
    pub fn new(
        path: impl Into<String>,
        operation_id: Option<String>,
        raw_method: Option<&str>,
        is_array_response: bool,
        is_paginated: bool,
        has_body: bool,
        body_fields: BTreeSet<String>,
    ) -> Result<Self, InvalidDescriptor> {
        let path = path.into();
        let raw = raw_method.ok_or_else(|| InvalidDescriptor::MissingMethod {
            path: path.clone(),
        })?;
        let method = raw
            .parse::<HttpMethod>()
            .map_err(|e| InvalidDescriptor::UnknownMethod {
                path: path.clone(),
                value: e.0,
            })?;

        Ok(Self {
            path,
            operation_id,
            method,
            is_array_response,
            is_paginated,
            has_body,
            body_fields,
        })
    }
}

/// Map a descriptor to its UI pattern. First match wins:
///
/// 1. GET returning an array: `paginated_list` when pagination markers are
///    present, otherwise `simple_list`.
/// 2. GET returning a single value: `detail_view`.
/// 3. POST with a body: `file_upload` when a `file` field is present,
///    otherwise `create_form`.
/// 4. PUT or PATCH: `edit_form`.
/// 5. DELETE: `delete_confirmation`.
/// 6. Anything else: `custom`.
pub fn classify(descriptor: &EndpointDescriptor) -> UiPattern {
    match descriptor.method {
        HttpMethod::Get if descriptor.is_array_response => {
            if descriptor.is_paginated {
                UiPattern::PaginatedList
            } else {
                UiPattern::SimpleList
            }
        }
        HttpMethod::Get => UiPattern::DetailView,
        HttpMethod::Post if descriptor.has_body => {
            if descriptor.body_fields.contains("file") {
                UiPattern::FileUpload
            } else {
                UiPattern::CreateForm
            }
        }
        HttpMethod::Put | HttpMethod::Patch => UiPattern::EditForm,
        HttpMethod::Delete => UiPattern::DeleteConfirmation,
        _ => UiPattern::Custom,
    }
}
