//! Structured condition evaluation.
//!
//! Conditions are data, not expressions: a small operator vocabulary with
//! `$var` operand references. Unresolvable operands make the enclosing
//! comparison false rather than failing the workflow.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Deep equality after operand resolution.
    Equals(Value, Value),
    Greater(Value, Value),
    Less(Value, Value),
    /// Membership: element in array, substring in string, key in object.
    In(Value, Value),
    /// A dotted variable path resolves to something.
    Exists(String),
}

const OPERATORS: &[&str] = &[
    "and", "or", "not", "equals", "greater", "less", "in", "exists",
];

// Conditions are written as plain single-key maps
// (`equals: ["$status", "ok"]`), which the derived externally-tagged
// representation does not accept from YAML. Hand-rolled impls keep the
// wire form stable in both directions.
impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Condition::And(children) => map.serialize_entry("and", children)?,
            Condition::Or(children) => map.serialize_entry("or", children)?,
            Condition::Not(child) => map.serialize_entry("not", child)?,
            Condition::Equals(l, r) => map.serialize_entry("equals", &(l, r))?,
            Condition::Greater(l, r) => map.serialize_entry("greater", &(l, r))?,
            Condition::Less(l, r) => map.serialize_entry("less", &(l, r))?,
            Condition::In(l, r) => map.serialize_entry("in", &(l, r))?,
            Condition::Exists(path) => map.serialize_entry("exists", path)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ConditionVisitor;

        impl<'de> Visitor<'de> for ConditionVisitor {
            type Value = Condition;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with exactly one condition operator key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Condition, A::Error> {
                let Some(operator) = map.next_key::<String>()? else {
                    return Err(de::Error::custom("condition map is empty"));
                };
                let condition = match operator.as_str() {
                    "and" => Condition::And(map.next_value()?),
                    "or" => Condition::Or(map.next_value()?),
                    "not" => Condition::Not(map.next_value()?),
                    "equals" => {
                        let (l, r) = map.next_value()?;
                        Condition::Equals(l, r)
                    }
                    "greater" => {
                        let (l, r) = map.next_value()?;
                        Condition::Greater(l, r)
                    }
                    "less" => {
                        let (l, r) = map.next_value()?;
                        Condition::Less(l, r)
                    }
                    "in" => {
                        let (l, r) = map.next_value()?;
                        Condition::In(l, r)
                    }
                    "exists" => Condition::Exists(map.next_value()?),
                    other => return Err(de::Error::unknown_variant(other, OPERATORS)),
                };
                if map.next_key::<String>()?.is_some() {
                    return Err(de::Error::custom(
                        "condition map must have exactly one operator key",
                    ));
                }
                Ok(condition)
            }
        }

        deserializer.deserialize_map(ConditionVisitor)
    }
}

impl Condition {
    pub fn evaluate(&self, variables: &BTreeMap<String, Value>) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.evaluate(variables)),
            Condition::Or(children) => children.iter().any(|c| c.evaluate(variables)),
            Condition::Not(child) => !child.evaluate(variables),
            Condition::Equals(left, right) => {
                match (resolve(left, variables), resolve(right, variables)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            Condition::Greater(left, right) => compare(left, right, variables)
                .map(|ord| ord == std::cmp::Ordering::Greater)
                .unwrap_or(false),
            Condition::Less(left, right) => compare(left, right, variables)
                .map(|ord| ord == std::cmp::Ordering::Less)
                .unwrap_or(false),
            Condition::In(needle, haystack) => {
                let (Some(needle), Some(haystack)) =
                    (resolve(needle, variables), resolve(haystack, variables))
                else {
                    return false;
                };
                contains(&haystack, &needle)
            }
            Condition::Exists(path) => lookup_path(path, variables).is_some(),
        }
    }
}

/// Resolve an operand: a string starting with `$` is a variable path.
fn resolve(operand: &Value, variables: &BTreeMap<String, Value>) -> Option<Value> {
    match operand {
        Value::String(s) => match s.strip_prefix('$') {
            Some(path) => lookup_path(path, variables),
            None => Some(operand.clone()),
        },
        other => Some(other.clone()),
    }
}

fn lookup_path(path: &str, variables: &BTreeMap<String, Value>) -> Option<Value> {
    let mut segments = path.split('.');
    let root = variables.get(segments.next()?)?;
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        return Some(root.clone());
    }
    crate::mapping::extract(root, &rest.join("."))
}

fn compare(
    left: &Value,
    right: &Value,
    variables: &BTreeMap<String, Value>,
) -> Option<std::cmp::Ordering> {
    let left = resolve(left, variables)?;
    let right = resolve(right, variables)?;
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|n| map.contains_key(n)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> BTreeMap<String, Value> {
        let mut vars = BTreeMap::new();
        vars.insert("status".to_string(), json!("ok"));
        vars.insert("count".to_string(), json!(5));
        vars.insert("tags".to_string(), json!(["fast", "safe"]));
        vars.insert("result".to_string(), json!({"summary": {"errors": 0}}));
        vars
    }

    fn eval(yaml: &str) -> bool {
        let condition: Condition = serde_yaml::from_str(yaml).expect("condition should parse");
        condition.evaluate(&vars())
    }

    #[test]
    fn equals_resolves_variable_references() {
        assert!(eval(r#"equals: ["$status", "ok"]"#));
        assert!(!eval(r#"equals: ["$status", "failed"]"#));
        assert!(eval(r#"equals: [3, 3]"#));
    }

    #[test]
    fn numeric_and_string_ordering() {
        assert!(eval(r#"greater: ["$count", 3]"#));
        assert!(!eval(r#"greater: ["$count", 5]"#));
        assert!(eval(r#"less: ["apple", "pear"]"#));
    }

    #[test]
    fn mixed_type_comparison_is_false() {
        assert!(!eval(r#"greater: ["$status", 3]"#));
        assert!(!eval(r#"less: ["$tags", 10]"#));
    }

    #[test]
    fn membership_over_arrays_strings_and_objects() {
        assert!(eval(r#"in: ["fast", "$tags"]"#));
        assert!(!eval(r#"in: ["slow", "$tags"]"#));
        assert!(eval(r#"in: ["k", "$status"]"#));
        assert!(eval(r#"in: ["summary", "$result"]"#));
    }

    #[test]
    fn exists_walks_dotted_paths() {
        assert!(eval("exists: result.summary.errors"));
        assert!(!eval("exists: result.summary.warnings"));
        assert!(!eval("exists: nothing"));
    }

    #[test]
    fn boolean_combinators() {
        assert!(eval(
            r#"
and:
  - equals: ["$status", "ok"]
  - greater: ["$count", 1]
"#
        ));
        assert!(eval(
            r#"
or:
  - equals: ["$status", "failed"]
  - exists: tags
"#
        ));
        assert!(eval(
            r#"
not:
  equals: ["$status", "failed"]
"#
        ));
    }

    #[test]
    fn unresolved_operand_makes_comparison_false() {
        assert!(!eval(r#"equals: ["$missing", "anything"]"#));
        assert!(!eval(r#"in: ["x", "$missing"]"#));
    }

    #[test]
    fn serialized_form_stays_a_single_key_map() {
        let condition: Condition = serde_yaml::from_str(
            r#"
and:
  - equals: ["$status", "ok"]
  - not:
      exists: nothing
"#,
        )
        .expect("condition should parse");
        assert!(condition.evaluate(&vars()));

        let rendered = serde_yaml::to_string(&condition).expect("should serialize");
        assert!(rendered.starts_with("and:"), "unexpected form: {rendered}");
        let reparsed: Condition = serde_yaml::from_str(&rendered).expect("should reparse");
        assert!(reparsed.evaluate(&vars()));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(serde_yaml::from_str::<Condition>("matches: [a, b]").is_err());
    }

    #[test]
    fn multiple_operator_keys_are_rejected() {
        let err = serde_yaml::from_str::<Condition>(
            r#"
equals: ["$status", "ok"]
exists: status
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one operator"));
    }
}
