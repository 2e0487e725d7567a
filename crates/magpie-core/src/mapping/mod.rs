//! Output mapping: extract values from a tool's JSON output and bind them
//! to workflow variables, with optional transforms.
//!
//! Paths use dot notation with numeric array indices (`data.users.0.name`)
//! and a trailing `[*]` projection (`data.users[*].score`). Transforms are
//! a typed vocabulary parsed from strings, chainable with `|`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One mapping from an output path to a workflow variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Path into the output value.
    pub source: String,
    /// Variable name to bind.
    pub target: String,
    /// Transform spec, e.g. `"number"` or `"split:,|reduce:count"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Fallback when the source is missing or a transform fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

/// Result of applying a rule set: bound variables plus the per-rule
/// problems that did not abort the mapping.
#[derive(Debug, Clone, Default)]
pub struct Mapped {
    pub variables: BTreeMap<String, Value>,
    pub errors: Vec<String>,
}

impl Mapped {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// A single transform step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Split(String),
    Join(String),
    Keys,
    Values,
    Reduce(ReduceOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
    Count,
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Count => "count",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transform: {0}")]
pub struct TransformParseError(pub String);

impl FromStr for Transform {
    type Err = TransformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((name, arg)) = s.split_once(':') {
            return match name {
                "split" => Ok(Transform::Split(arg.to_string())),
                "join" => Ok(Transform::Join(arg.to_string())),
                "reduce" => match arg {
                    "sum" => Ok(Transform::Reduce(ReduceOp::Sum)),
                    "min" => Ok(Transform::Reduce(ReduceOp::Min)),
                    "max" => Ok(Transform::Reduce(ReduceOp::Max)),
                    "count" => Ok(Transform::Reduce(ReduceOp::Count)),
                    _ => Err(TransformParseError(s.to_string())),
                },
                _ => Err(TransformParseError(s.to_string())),
            };
        }
        match s {
            "string" => Ok(Transform::String),
            "number" => Ok(Transform::Number),
            "boolean" => Ok(Transform::Boolean),
            "array" => Ok(Transform::Array),
            "object" => Ok(Transform::Object),
            "keys" => Ok(Transform::Keys),
            "values" => Ok(Transform::Values),
            other => Err(TransformParseError(other.to_string())),
        }
    }
}

/// Parse a `|`-separated transform pipeline.
pub fn parse_pipeline(spec: &str) -> Result<Vec<Transform>, TransformParseError> {
    spec.split('|').map(|step| step.trim().parse()).collect()
}

// ---------------------------------------------------------------------------
// Path extraction
// ---------------------------------------------------------------------------

/// Extract a value by path. Returns `None` when any segment is missing.
pub fn extract(value: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }

    // A trailing [*] projects the remainder of the path over an array.
    if let Some((prefix, rest)) = path.split_once("[*]") {
        let array = extract(value, prefix)?;
        let items = array.as_array()?;
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        let projected: Vec<Value> = items
            .iter()
            .filter_map(|item| extract(item, rest))
            .collect();
        return Some(Value::Array(projected));
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

// ---------------------------------------------------------------------------
// Transform application
// ---------------------------------------------------------------------------

fn apply(value: Value, transform: &Transform) -> Result<Value, String> {
    match transform {
        Transform::String => Ok(Value::String(to_display_string(&value))),
        Transform::Number => to_number(&value)
            .map(Value::from)
            .ok_or_else(|| format!("cannot convert {} to number", kind(&value))),
        Transform::Boolean => to_boolean(&value)
            .map(Value::Bool)
            .ok_or_else(|| format!("cannot convert {} to boolean", kind(&value))),
        Transform::Array => Ok(to_array(value)),
        Transform::Object => match value {
            Value::Object(_) => Ok(value),
            Value::String(s) => serde_json::from_str::<Value>(&s)
                .ok()
                .filter(Value::is_object)
                .ok_or_else(|| "string does not parse as a JSON object".to_string()),
            other => Err(format!("cannot convert {} to object", kind(&other))),
        },
        Transform::Split(sep) => match value {
            Value::String(s) => Ok(Value::Array(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            )),
            other => Err(format!("split expects a string, got {}", kind(&other))),
        },
        Transform::Join(sep) => match value {
            Value::Array(items) => Ok(Value::String(
                items
                    .iter()
                    .map(to_display_string)
                    .collect::<Vec<_>>()
                    .join(sep),
            )),
            other => Err(format!("join expects an array, got {}", kind(&other))),
        },
        Transform::Keys => match value {
            Value::Object(map) => Ok(Value::Array(
                map.keys().cloned().map(Value::String).collect(),
            )),
            other => Err(format!("keys expects an object, got {}", kind(&other))),
        },
        Transform::Values => match value {
            Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
            other => Err(format!("values expects an object, got {}", kind(&other))),
        },
        Transform::Reduce(op) => reduce(value, *op),
    }
}

fn reduce(value: Value, op: ReduceOp) -> Result<Value, String> {
    let Value::Array(items) = value else {
        return Err(format!("reduce expects an array, got {}", kind(&value)));
    };
    if op == ReduceOp::Count {
        return Ok(Value::from(items.len()));
    }

    let mut numbers = Vec::with_capacity(items.len());
    for item in &items {
        match to_number(item) {
            Some(n) => numbers.push(n),
            None => return Err(format!("reduce:{op} expects numeric elements")),
        }
    }
    let result = match op {
        ReduceOp::Sum => numbers.iter().sum(),
        ReduceOp::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        ReduceOp::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ReduceOp::Count => unreachable!(),
    };
    if numbers.is_empty() && matches!(op, ReduceOp::Min | ReduceOp::Max) {
        return Err(format!("reduce:{op} on an empty array"));
    }
    Ok(Value::from(result))
}

fn to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Null => Some(false),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_array(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::String(s) if s.contains(',') => Value::Array(
            s.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        ),
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Apply every rule to the output. Problems (missing required sources,
/// bad transform specs, failed conversions) are collected rather than
/// aborting the remaining rules; defaults fill in where given.
pub fn map_output(output: &Value, rules: &[MappingRule]) -> Mapped {
    let mut mapped = Mapped::default();

    for rule in rules {
        let extracted = extract(output, &rule.source);

        let value = match extracted {
            Some(value) => value,
            None => {
                if let Some(default) = &rule.default {
                    mapped.variables.insert(rule.target.clone(), default.clone());
                } else if rule.required {
                    mapped
                        .errors
                        .push(format!("required source '{}' not found", rule.source));
                }
                continue;
            }
        };

        let value = match &rule.transform {
            None => Ok(value),
            Some(spec) => match parse_pipeline(spec) {
                Err(e) => Err(e.to_string()),
                Ok(pipeline) => pipeline
                    .iter()
                    .try_fold(value, |acc, transform| apply(acc, transform)),
            },
        };

        match value {
            Ok(value) => {
                mapped.variables.insert(rule.target.clone(), value);
            }
            Err(reason) => {
                mapped
                    .errors
                    .push(format!("rule '{}' -> '{}': {reason}", rule.source, rule.target));
                if let Some(default) = &rule.default {
                    mapped.variables.insert(rule.target.clone(), default.clone());
                }
            }
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(source: &str, target: &str, transform: Option<&str>) -> MappingRule {
        MappingRule {
            source: source.to_string(),
            target: target.to_string(),
            transform: transform.map(str::to_string),
            default: None,
            required: false,
        }
    }

    #[test]
    fn extracts_nested_paths_with_indices() {
        let output = json!({"data": {"users": [{"name": "ada"}, {"name": "brian"}]}});
        assert_eq!(
            extract(&output, "data.users.1.name"),
            Some(json!("brian"))
        );
        assert_eq!(extract(&output, "data.users.5.name"), None);
        assert_eq!(extract(&output, "data.missing"), None);
    }

    #[test]
    fn star_projection_collects_field_values() {
        let output = json!({"users": [{"score": 3}, {"score": 7}, {"name": "no score"}]});
        assert_eq!(
            extract(&output, "users[*].score"),
            Some(json!([3, 7]))
        );
        assert_eq!(extract(&output, "users[*]"), extract(&output, "users"));
    }

    #[test]
    fn basic_type_transforms() {
        let output = json!({"n": "42", "flag": "yes", "csv": "a, b, c"});
        let mapped = map_output(
            &output,
            &[
                rule("n", "count", Some("number")),
                rule("flag", "enabled", Some("boolean")),
                rule("csv", "parts", Some("array")),
            ],
        );
        assert!(mapped.is_clean());
        assert_eq!(mapped.variables["count"], json!(42.0));
        assert_eq!(mapped.variables["enabled"], json!(true));
        assert_eq!(mapped.variables["parts"], json!(["a", "b", "c"]));
    }

    #[test]
    fn split_join_keys_values() {
        let output = json!({"line": "x;y;z", "obj": {"a": 1, "b": 2}});
        let mapped = map_output(
            &output,
            &[
                rule("line", "fields", Some("split:;")),
                rule("obj", "names", Some("keys")),
                rule("obj", "nums", Some("values")),
                rule("obj", "joined", Some("keys|join:-")),
            ],
        );
        assert!(mapped.is_clean());
        assert_eq!(mapped.variables["fields"], json!(["x", "y", "z"]));
        assert_eq!(mapped.variables["names"], json!(["a", "b"]));
        assert_eq!(mapped.variables["nums"], json!([1, 2]));
        assert_eq!(mapped.variables["joined"], json!("a-b"));
    }

    #[test]
    fn reduce_pipeline_over_projection() {
        let output = json!({"runs": [{"ms": 10}, {"ms": 30}, {"ms": 20}]});
        let mapped = map_output(
            &output,
            &[
                rule("runs[*].ms", "total", Some("reduce:sum")),
                rule("runs[*].ms", "slowest", Some("reduce:max")),
                rule("runs", "count", Some("reduce:count")),
            ],
        );
        assert!(mapped.is_clean());
        assert_eq!(mapped.variables["total"], json!(60.0));
        assert_eq!(mapped.variables["slowest"], json!(30.0));
        assert_eq!(mapped.variables["count"], json!(3));
    }

    #[test]
    fn missing_required_source_is_an_error() {
        let mapped = map_output(
            &json!({}),
            &[MappingRule {
                required: true,
                ..rule("absent", "x", None)
            }],
        );
        assert_eq!(mapped.errors.len(), 1);
        assert!(!mapped.variables.contains_key("x"));
    }

    #[test]
    fn default_fills_missing_source() {
        let mapped = map_output(
            &json!({}),
            &[MappingRule {
                default: Some(json!("fallback")),
                ..rule("absent", "x", None)
            }],
        );
        assert!(mapped.is_clean());
        assert_eq!(mapped.variables["x"], json!("fallback"));
    }

    #[test]
    fn failed_transform_records_error_and_uses_default() {
        let mapped = map_output(
            &json!({"word": "not-a-number"}),
            &[MappingRule {
                default: Some(json!(0)),
                ..rule("word", "n", Some("number"))
            }],
        );
        assert_eq!(mapped.errors.len(), 1);
        assert_eq!(mapped.variables["n"], json!(0));
    }

    #[test]
    fn unknown_transform_is_collected_not_fatal() {
        let mapped = map_output(
            &json!({"a": 1, "b": 2}),
            &[rule("a", "x", Some("frobnicate")), rule("b", "y", None)],
        );
        assert_eq!(mapped.errors.len(), 1);
        assert_eq!(mapped.variables["y"], json!(2));
    }

    #[test]
    fn transform_parse_vocabulary() {
        assert_eq!("split:,".parse(), Ok(Transform::Split(",".to_string())));
        assert_eq!("reduce:min".parse(), Ok(Transform::Reduce(ReduceOp::Min)));
        assert!("reduce:avg".parse::<Transform>().is_err());
        assert!("eval:x+1".parse::<Transform>().is_err());
        assert_eq!(
            parse_pipeline("split:, | reduce:count"),
            Ok(vec![
                Transform::Split(",".to_string()),
                Transform::Reduce(ReduceOp::Count)
            ])
        );
    }
}
