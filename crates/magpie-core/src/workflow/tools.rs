//! Tool handlers invocable from workflow tasks.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::classify::classify;
use crate::convert;
use crate::openapi::Document;
use crate::registry::validate::validate_entry;
use crate::registry::{Registry, ScriptEntry};

/// A named capability a task can invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value>;
}

/// Name-to-handler table shared by the engine.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("classify_endpoints", Arc::new(ClassifyEndpoints));
        registry.register("yaml_to_json", Arc::new(YamlToJson));
        registry.register("validate_metadata", Arc::new(ValidateMetadata));
        registry.register("set", Arc::new(SetValue));
        registry.register("log", Arc::new(LogMessage));
        registry
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

fn required_str<'a>(params: &'a BTreeMap<String, Value>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing required string parameter '{key}'"))
}

// ---------------------------------------------------------------------------
// Built-in tools
// ---------------------------------------------------------------------------

/// Classify every endpoint in an OpenAPI file.
///
/// Parameters: `spec` (path). Output: `{ endpoints: [...], count }` where
/// each element carries path, method, operation id, and the pattern.
struct ClassifyEndpoints;

#[async_trait]
impl ToolHandler for ClassifyEndpoints {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value> {
        let spec = PathBuf::from(required_str(params, "spec")?);
        let document = Document::load(&spec)
            .with_context(|| format!("failed to load OpenAPI document {}", spec.display()))?;
        let descriptors = document.descriptors()?;

        let endpoints: Vec<Value> = descriptors
            .iter()
            .map(|d| {
                json!({
                    "path": d.path,
                    "method": d.method.to_string(),
                    "operation_id": d.operation_id,
                    "pattern": classify(d).to_string(),
                })
            })
            .collect();
        Ok(json!({ "count": endpoints.len(), "endpoints": endpoints }))
    }
}

/// Convert a YAML file to JSON.
///
/// Parameters: `input` (path), optional `output` (path), optional
/// `compact` (bool).
struct YamlToJson;

#[async_trait]
impl ToolHandler for YamlToJson {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value> {
        let input = PathBuf::from(required_str(params, "input")?);
        let output = params
            .get("output")
            .and_then(Value::as_str)
            .map(PathBuf::from);
        let compact = params
            .get("compact")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let (outcome, text) = convert::convert_file(&input, output.as_deref(), !compact)?;
        Ok(json!({
            "data_type": outcome.data_type,
            "size": outcome.size,
            "json": text,
        }))
    }
}

/// Validate script metadata.
///
/// Parameters: either `file` (a registry JSON path, validating every
/// entry) or `entry` (an inline metadata object).
struct ValidateMetadata;

#[async_trait]
impl ToolHandler for ValidateMetadata {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value> {
        let entries: Vec<ScriptEntry> = if let Some(file) = params.get("file").and_then(Value::as_str)
        {
            Registry::load(&PathBuf::from(file))?.scripts
        } else if let Some(inline) = params.get("entry") {
            vec![serde_json::from_value(inline.clone())
                .context("parameter 'entry' is not a metadata object")?]
        } else {
            bail!("expected parameter 'file' or 'entry'");
        };

        let mut reports = Vec::new();
        let mut valid = true;
        for entry in &entries {
            let report = validate_entry(entry);
            valid &= report.is_valid();
            reports.push(json!({
                "id": entry.id,
                "errors": report.errors,
                "warnings": report.warnings,
                "suggestions": report.suggestions,
            }));
        }
        Ok(json!({ "valid": valid, "reports": reports }))
    }
}

/// Bind constants into workflow variables through an output mapping.
/// Returns its parameters unchanged.
struct SetValue;

#[async_trait]
impl ToolHandler for SetValue {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value> {
        Ok(Value::Object(params.clone().into_iter().collect()))
    }
}

/// Emit a log event. Parameters: `message`, optional `level`
/// (`info`/`warn`/`error`, defaulting to info).
struct LogMessage;

#[async_trait]
impl ToolHandler for LogMessage {
    async fn call(&self, params: &BTreeMap<String, Value>) -> Result<Value> {
        let message = required_str(params, "message")?;
        match params.get("level").and_then(Value::as_str) {
            Some("warn") => tracing::warn!(source = "workflow", "{message}"),
            Some("error") => tracing::error!(source = "workflow", "{message}"),
            _ => info!(source = "workflow", "{message}"),
        }
        Ok(Value::Null)
    }
}
