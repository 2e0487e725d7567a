//! YAML to JSON conversion.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// Metadata about a completed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutcome {
    /// JSON type of the document root (`object`, `array`, ...).
    pub data_type: &'static str,
    /// Size of the rendered JSON in bytes.
    pub size: usize,
}

/// Convert YAML text to a JSON string.
pub fn yaml_to_json(yaml: &str, pretty: bool) -> Result<String> {
    let value: Value = serde_yaml::from_str(yaml).context("YAML parsing error")?;
    render(&value, pretty)
}

/// Convert a YAML file, writing JSON to `output` or returning it for
/// stdout when `output` is `None`.
pub fn convert_file(
    input: &Path,
    output: Option<&Path>,
    pretty: bool,
) -> Result<(ConvertOutcome, Option<String>)> {
    let yaml = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let value: Value = serde_yaml::from_str(&yaml)
        .with_context(|| format!("YAML parsing error in {}", input.display()))?;
    let json = render(&value, pretty)?;
    let outcome = ConvertOutcome {
        data_type: data_type(&value),
        size: json.len(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok((outcome, None))
        }
        None => Ok((outcome, Some(json))),
    }
}

fn render(value: &Value, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn data_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_mapping_to_pretty_json() {
        let json = yaml_to_json("name: magpie\ncount: 2\n", true).expect("should convert");
        assert!(json.contains("\"name\": \"magpie\""));
        assert!(json.contains('\n'));
    }

    #[test]
    fn compact_output_has_no_spaces() {
        let json = yaml_to_json("items:\n  - 1\n  - 2\n", false).expect("should convert");
        assert_eq!(json, r#"{"items":[1,2]}"#);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(yaml_to_json("a: [unterminated", true).is_err());
    }

    #[test]
    fn file_conversion_reports_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("doc.yaml");
        let output = dir.path().join("doc.json");
        std::fs::write(&input, "kind: demo\n").expect("write input");

        let (outcome, text) =
            convert_file(&input, Some(&output), false).expect("should convert");
        assert_eq!(outcome.data_type, "object");
        assert!(text.is_none());
        let written = std::fs::read_to_string(&output).expect("read output");
        assert_eq!(written, "{\"kind\":\"demo\"}\n");
        assert_eq!(outcome.size, written.len() - 1);
    }

    #[test]
    fn stdout_mode_returns_the_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("list.yml");
        std::fs::write(&input, "- a\n- b\n").expect("write input");

        let (outcome, text) = convert_file(&input, None, true).expect("should convert");
        assert_eq!(outcome.data_type, "array");
        assert!(text.expect("json text").starts_with('['));
    }
}
