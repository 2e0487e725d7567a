//! Workflow definitions and their executor.
//!
//! Workflows are YAML documents with a flat list of steps. Step kinds:
//! `task` (invoke a tool), `parallel` (tasks joined concurrently),
//! `conditional` (structured condition with then/else), `loop` (`for` over
//! a variable or `while` a condition holds), and `compose` (a pipeline
//! where each task's output feeds the next as `piped_input`).

pub mod condition;
pub mod engine;
pub mod tools;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::mapping::MappingRule;

pub use condition::Condition;
pub use engine::{RunState, TaskOutcome, WorkflowEngine};
pub use tools::{ToolHandler, ToolRegistry};

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A parsed workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// One workflow step, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Task(TaskStep),
    Parallel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tasks: Vec<TaskStep>,
    },
    Conditional {
        condition: Condition,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        then: Vec<Step>,
        #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<Step>,
    },
    Loop(LoopStep),
    Compose {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        tasks: Vec<TaskStep>,
    },
}

/// A tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_mapping: Vec<MappingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub continue_on_error: bool,
}

/// Per-task retry with a fixed delay between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// A `for` loop (`over` + `variable`) or a `while` loop
/// (`condition` + `max_iterations`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    pub body: Vec<Step>,
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkflowParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("workflow '{workflow}': {reason}")]
    Invalid { workflow: String, reason: String },
}

impl Workflow {
    pub fn from_yaml(content: &str) -> Result<Self, WorkflowParseError> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn load(path: &Path) -> Result<Self, WorkflowParseError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| WorkflowParseError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml(&content)
    }

    /// Structural checks performed before execution: at least one step,
    /// unique task ids, dependencies on earlier-declared tasks only, and
    /// well-formed loops.
    pub fn validate(&self) -> Result<(), WorkflowParseError> {
        let fail = |reason: String| {
            Err(WorkflowParseError::Invalid {
                workflow: self.id.clone(),
                reason,
            })
        };

        if self.id.is_empty() {
            return fail("workflow id is empty".to_string());
        }
        if self.steps.is_empty() {
            return fail("workflow has no steps".to_string());
        }

        let mut seen = BTreeSet::new();
        self.check_steps(&self.steps, &mut seen)
    }

    fn check_steps(
        &self,
        steps: &[Step],
        seen: &mut BTreeSet<String>,
    ) -> Result<(), WorkflowParseError> {
        for step in steps {
            match step {
                Step::Task(task) => self.check_task(task, seen)?,
                Step::Parallel { tasks, .. } | Step::Compose { tasks, .. } => {
                    for task in tasks {
                        self.check_task(task, seen)?;
                    }
                }
                Step::Conditional {
                    then, otherwise, ..
                } => {
                    self.check_steps(then, seen)?;
                    self.check_steps(otherwise, seen)?;
                }
                Step::Loop(looped) => {
                    self.check_loop(looped)?;
                    self.check_steps(&looped.body, seen)?;
                }
            }
        }
        Ok(())
    }

    fn check_task(
        &self,
        task: &TaskStep,
        seen: &mut BTreeSet<String>,
    ) -> Result<(), WorkflowParseError> {
        let fail = |reason: String| {
            Err(WorkflowParseError::Invalid {
                workflow: self.id.clone(),
                reason,
            })
        };

        if task.id.is_empty() {
            return fail("task id is empty".to_string());
        }
        if task.tool.is_empty() {
            return fail(format!("task '{}' has no tool", task.id));
        }
        if !seen.insert(task.id.clone()) {
            return fail(format!("duplicate task id '{}'", task.id));
        }
        for dep in &task.depends_on {
            if !seen.contains(dep) {
                return fail(format!(
                    "task '{}' depends on '{dep}', which is not declared earlier",
                    task.id
                ));
            }
        }
        if let Some(retry) = &task.retry {
            if retry.max_attempts == 0 {
                return fail(format!("task '{}': retry.max_attempts must be >= 1", task.id));
            }
        }
        Ok(())
    }

    fn check_loop(&self, looped: &LoopStep) -> Result<(), WorkflowParseError> {
        let fail = |reason: String| {
            Err(WorkflowParseError::Invalid {
                workflow: self.id.clone(),
                reason,
            })
        };

        match (&looped.over, &looped.condition) {
            (Some(_), Some(_)) => fail("loop cannot have both 'over' and 'condition'".to_string()),
            (None, None) => fail("loop needs either 'over' or 'condition'".to_string()),
            (None, Some(_)) if looped.max_iterations.is_none() => {
                fail("while loop requires 'max_iterations'".to_string())
            }
            _ if looped.body.is_empty() => fail("loop body is empty".to_string()),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Variable substitution
// ---------------------------------------------------------------------------

/// Resolve `$name` whole-value references and `${name}` templates inside a
/// parameter value, recursively through maps and lists. Unknown references
/// are left as written.
pub fn resolve_value(value: &Value, variables: &BTreeMap<String, Value>) -> Value {
    match value {
        Value::String(s) => resolve_string(s, variables),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, variables)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, variables)).collect())
        }
        other => other.clone(),
    }
}

fn resolve_string(s: &str, variables: &BTreeMap<String, Value>) -> Value {
    // Whole-value reference keeps the variable's JSON type.
    if let Some(name) = s.strip_prefix('$') {
        if !name.starts_with('{') {
            return variables
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::String(s.to_string()));
        }
    }

    if !s.contains("${") {
        return Value::String(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(Value::String(v)) => out.push_str(v),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}
