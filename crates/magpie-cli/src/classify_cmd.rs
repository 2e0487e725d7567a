//! `magpie classify` command: derive and print UI patterns for every
//! endpoint of an OpenAPI document.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::json;

use magpie_core::classify::classify;
use magpie_core::openapi::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

struct Row {
    path: String,
    method: String,
    operation_id: String,
    pattern: String,
}

pub fn run(spec: &Path, format: OutputFormat, strict: bool) -> Result<()> {
    let document = Document::load(spec)
        .with_context(|| format!("failed to load OpenAPI document {}", spec.display()))?;

    let mut rows = Vec::new();
    let mut problems = Vec::new();
    for (path, item) in &document.paths {
        for (method, op) in &item.operations {
            match document.descriptor_for(path, item, method, op) {
                Ok(descriptor) => rows.push(Row {
                    path: descriptor.path.clone(),
                    method: descriptor.method.to_string(),
                    operation_id: descriptor.operation_id.clone().unwrap_or_default(),
                    pattern: classify(&descriptor).to_string(),
                }),
                Err(e) if strict => {
                    return Err(e).with_context(|| format!("{method} {path}"));
                }
                Err(e) => problems.push(format!("{method} {path}: {e}")),
            }
        }
    }

    match format {
        OutputFormat::Json => print_json(&rows, &problems)?,
        OutputFormat::Table => print_table(&rows, &problems),
    }
    Ok(())
}

fn print_json(rows: &[Row], problems: &[String]) -> Result<()> {
    let endpoints: Vec<_> = rows
        .iter()
        .map(|r| {
            json!({
                "path": r.path,
                "method": r.method,
                "operation_id": r.operation_id,
                "pattern": r.pattern,
            })
        })
        .collect();
    let doc = json!({ "endpoints": endpoints, "problems": problems });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn print_table(rows: &[Row], problems: &[String]) {
    if rows.is_empty() && problems.is_empty() {
        println!("No endpoints found.");
        return;
    }

    let path_width = rows
        .iter()
        .map(|r| r.path.len())
        .chain(std::iter::once("PATH".len()))
        .max()
        .unwrap_or(4);
    let op_width = rows
        .iter()
        .map(|r| r.operation_id.len())
        .chain(std::iter::once("OPERATION".len()))
        .max()
        .unwrap_or(9);

    println!(
        "{:<7} {:<path_width$} {:<op_width$} PATTERN",
        "METHOD", "PATH", "OPERATION"
    );
    for row in rows {
        println!(
            "{:<7} {:<path_width$} {:<op_width$} {}",
            row.method, row.path, row.operation_id, row.pattern
        );
    }

    if !problems.is_empty() {
        println!();
        println!("Problems ({}):", problems.len());
        for problem in problems {
            println!("  ! {problem}");
        }
    }
}
