//! Metadata validation against the registry schema.
//!
//! Problems are split by severity: `errors` block registration, `warnings`
//! flag style and consistency issues, `suggestions` are purely advisory.

use std::str::FromStr;

use serde::Serialize;

use super::{ArgType, Category, SandboxLevel, ScriptEntry};

/// Known top-level metadata fields.
const KNOWN_FIELDS: &[&str] = &[
    "id",
    "name",
    "category",
    "path",
    "description",
    "version",
    "execution",
    "outputs",
    "specialists",
    "dependencies",
    "security",
    "examples",
    "tags",
    "author",
    "last_updated",
];

const VALID_PERMISSIONS: &[&str] = &["read_file", "write_file", "network", "execute", "system"];

/// Outcome of validating one script entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate one entry. Never fails; every problem becomes a report line.
pub fn validate_entry(entry: &ScriptEntry) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_required(&mut report, "id", &entry.id);
    check_required(&mut report, "name", &entry.name);
    check_required(&mut report, "category", &entry.category);
    check_required(&mut report, "path", &entry.path);
    check_required(&mut report, "description", &entry.description);
    check_required(&mut report, "version", &entry.version);
    if entry.execution.is_none() {
        report.errors.push("missing required field: 'execution'".to_string());
    }

    if let Some(id) = &entry.id {
        if !id.is_empty() && !is_valid_id(id) {
            report.errors.push(format!(
                "invalid id format: '{id}' (expected 'category/script-name')"
            ));
        }
    }

    if let Some(category) = &entry.category {
        if !category.is_empty() && Category::from_str(category).is_err() {
            report
                .errors
                .push(format!("invalid category: '{category}'"));
        }
    }

    if let Some(path) = &entry.path {
        if !path.is_empty() && !path.starts_with("scripts/") {
            report
                .warnings
                .push(format!("path should start with 'scripts/': '{path}'"));
        }
    }

    if let Some(version) = &entry.version {
        if !version.is_empty() && !is_semver(version) {
            report.errors.push(format!(
                "invalid version format: '{version}' (expected semantic versioning, e.g. 1.0.0)"
            ));
        }
    }

    if let Some(execution) = &entry.execution {
        if execution.kind.as_deref().unwrap_or("").is_empty() {
            report.errors.push("missing execution field: 'type'".to_string());
        }
        if execution.interpreter.as_deref().unwrap_or("").is_empty() {
            report
                .errors
                .push("missing execution field: 'interpreter'".to_string());
        }

        for (i, arg) in execution.args.iter().enumerate() {
            if arg.name.as_deref().unwrap_or("").is_empty() {
                report
                    .errors
                    .push(format!("argument {i}: missing required field 'name'"));
            } else if let Some(name) = &arg.name {
                if !is_snake_case(name) {
                    report.warnings.push(format!(
                        "argument {i}: name '{name}' should follow snake_case convention"
                    ));
                }
            }
            match &arg.arg_type {
                None => report
                    .errors
                    .push(format!("argument {i}: missing required field 'type'")),
                Some(t) if ArgType::from_str(t).is_err() => report
                    .errors
                    .push(format!("argument {i}: invalid type '{t}'")),
                Some(_) => {}
            }
            if arg.description.as_deref().unwrap_or("").is_empty() {
                report
                    .errors
                    .push(format!("argument {i}: missing required field 'description'"));
            }
        }

        if let Some(timeout) = execution.timeout {
            if timeout <= 0 {
                report
                    .errors
                    .push("timeout must be a positive number".to_string());
            }
        }

        for perm in &execution.permissions {
            if !VALID_PERMISSIONS.contains(&perm.as_str()) {
                report
                    .warnings
                    .push(format!("unknown permission: '{perm}'"));
            }
        }
    }

    if let Some(outputs) = &entry.outputs {
        for (i, output) in outputs.iter().enumerate() {
            if output.name.as_deref().unwrap_or("").is_empty() {
                report
                    .errors
                    .push(format!("output {i}: missing required field 'name'"));
            }
            match &output.output_type {
                None => report
                    .errors
                    .push(format!("output {i}: missing required field 'type'")),
                Some(t) if ArgType::from_str(t).is_err() => report
                    .warnings
                    .push(format!("output {i}: unknown type '{t}'")),
                Some(_) => {}
            }
            if output.description.as_deref().unwrap_or("").is_empty() {
                report
                    .errors
                    .push(format!("output {i}: missing required field 'description'"));
            }
        }
    }

    if let Some(security) = &entry.security {
        match &security.sandbox {
            None => report
                .warnings
                .push("security configuration missing 'sandbox' field".to_string()),
            Some(sandbox) if SandboxLevel::from_str(sandbox).is_err() => report
                .errors
                .push(format!("invalid sandbox level: '{sandbox}'")),
            Some(_) => {}
        }
        if let Some(max_memory) = &security.max_memory {
            if !is_memory_limit(max_memory) {
                report.errors.push(format!(
                    "invalid memory limit format: '{max_memory}' (expected e.g. '512MB' or '1GB')"
                ));
            }
        }
    }

    for dep in &entry.dependencies {
        if dep.is_empty() {
            report.errors.push("invalid empty dependency".to_string());
        }
    }

    for field in entry.extra.keys() {
        if !KNOWN_FIELDS.contains(&field.as_str()) {
            report.warnings.push(format!("unknown field: '{field}'"));
        }
    }

    add_suggestions(&mut report, entry);
    report
}

fn add_suggestions(report: &mut ValidationReport, entry: &ScriptEntry) {
    if let Some(description) = &entry.description {
        if !description.is_empty() {
            if description.len() < 10 {
                report
                    .suggestions
                    .push("description is very short, consider adding more detail".to_string());
            } else if description.len() > 200 {
                report
                    .suggestions
                    .push("description is quite long, consider making it more concise".to_string());
            }
        }
    }

    if entry.outputs.is_none() {
        report
            .suggestions
            .push("consider adding 'outputs' field for better documentation".to_string());
    }
    if entry.security.is_none() {
        report
            .suggestions
            .push("consider adding 'security' field for better documentation".to_string());
    }
    if entry.tags.is_none() {
        report
            .suggestions
            .push("consider adding 'tags' field for better documentation".to_string());
    }
    if entry.examples.is_empty() {
        report
            .suggestions
            .push("consider adding usage examples".to_string());
    }
    if let Some(execution) = &entry.execution {
        if execution.timeout.is_none() {
            report
                .suggestions
                .push("consider specifying an execution timeout".to_string());
        }
    }
    if let Some(tags) = &entry.tags {
        if tags.len() < 2 {
            report
                .suggestions
                .push("consider adding more tags for better discoverability".to_string());
        }
    }
}

fn check_required(report: &mut ValidationReport, field: &str, value: &Option<String>) {
    match value {
        None => report
            .errors
            .push(format!("missing required field: '{field}'")),
        Some(v) if v.is_empty() => report
            .errors
            .push(format!("required field '{field}' is empty")),
        Some(_) => {}
    }
}

/// `^[a-z0-9-]+/[a-z0-9-]+$`
fn is_valid_id(id: &str) -> bool {
    let Some((category, name)) = id.split_once('/') else {
        return false;
    };
    let ok = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    ok(category) && ok(name)
}

/// `^\d+\.\d+\.\d+$`
fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// `^[a-z_][a-z0-9_]*$`
fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `^\d+(MB|GB)$`
fn is_memory_limit(limit: &str) -> bool {
    let digits = limit
        .strip_suffix("MB")
        .or_else(|| limit.strip_suffix("GB"));
    matches!(digits, Some(d) if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
}
