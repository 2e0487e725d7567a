//! `magpie registry` commands: validate, show, list, stats.

use std::path::Path;

use anyhow::{Context, Result};

use magpie_core::registry::fixup::auto_fix;
use magpie_core::registry::validate::validate_entry;
use magpie_core::registry::{registry_cache_config, Registry, RegistryCache, ScriptEntry};

/// `registry validate <file> [--fix] [--output <path>]`.
///
/// Validates every entry; with `--fix`, applies mechanical fixes and
/// writes the fixed registry to `--output` (or back to the input file).
pub fn validate(file: &Path, fix: bool, output: Option<&Path>) -> Result<()> {
    let registry = Registry::load(file)?;
    let mut fixed_scripts = Vec::with_capacity(registry.scripts.len());
    let mut error_count = 0;
    let mut warning_count = 0;

    for entry in &registry.scripts {
        let label = entry
            .id
            .clone()
            .or_else(|| entry.name.clone())
            .unwrap_or_else(|| "<unnamed>".to_string());

        let (entry_to_check, fixes) = if fix {
            auto_fix(entry)
        } else {
            (entry.clone(), Vec::new())
        };

        let report = validate_entry(&entry_to_check);
        error_count += report.errors.len();
        warning_count += report.warnings.len();

        println!("{label}:");
        for applied in &fixes {
            println!("  * fixed: {applied}");
        }
        for error in &report.errors {
            println!("  ✗ {error}");
        }
        for warning in &report.warnings {
            println!("  ⚠ {warning}");
        }
        for suggestion in &report.suggestions {
            println!("  → {suggestion}");
        }
        if report.is_valid() && report.warnings.is_empty() {
            println!("  ✓ ok");
        }

        fixed_scripts.push(entry_to_check);
    }

    println!();
    println!(
        "{} scripts checked: {error_count} errors, {warning_count} warnings",
        registry.scripts.len()
    );

    if fix {
        let target = output.unwrap_or(file);
        let fixed = Registry {
            scripts: fixed_scripts,
        };
        let rendered = serde_json::to_string_pretty(&fixed)?;
        std::fs::write(target, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", target.display()))?;
        println!("Fixed registry written to {}", target.display());
    }

    if error_count > 0 {
        anyhow::bail!("registry validation failed with {error_count} errors");
    }
    Ok(())
}

/// `registry show <id>`.
pub fn show(registry_path: &Path, id: &str) -> Result<()> {
    let cache = RegistryCache::open(registry_path)?;
    match cache.script(id)? {
        Some(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
        None => anyhow::bail!("no script with id '{id}' in {}", registry_path.display()),
    }
}

/// `registry list [--specialist <name>]`.
pub fn list(registry_path: &Path, specialist: Option<&str>) -> Result<()> {
    let cache = RegistryCache::open(registry_path)?;
    let scripts = match specialist {
        Some(name) => cache.scripts_by_specialist(name)?,
        None => cache.all_scripts()?,
    };

    if scripts.is_empty() {
        println!("No scripts found.");
        return Ok(());
    }
    for entry in &scripts {
        println!(
            "{:<30} {:<12} {}",
            entry.id.as_deref().unwrap_or("-"),
            entry.category.as_deref().unwrap_or("-"),
            entry.description.as_deref().unwrap_or("")
        );
    }
    println!();
    println!("{} scripts", scripts.len());
    Ok(())
}

/// `registry stats`: run a representative lookup workload and print the
/// cache counters.
pub fn stats(registry_path: &Path) -> Result<()> {
    let cache = RegistryCache::open_with_config(registry_path, registry_cache_config())?;
    let scripts = cache.all_scripts()?;

    // Two passes over every id: the second pass should be all hits.
    let ids: Vec<String> = scripts.iter().filter_map(|s: &ScriptEntry| s.id.clone()).collect();
    for _ in 0..2 {
        for id in &ids {
            cache.script(id)?;
        }
    }

    let stats = cache.stats();
    println!("Registry cache stats:");
    println!("  entries:     {}", stats.entries);
    println!("  bytes:       {}", stats.bytes);
    println!("  hits:        {}", stats.hits);
    println!("  misses:      {}", stats.misses);
    println!("  evictions:   {}", stats.evictions);
    println!("  expirations: {}", stats.expirations);
    println!("  hit rate:    {:.1}%", stats.hit_rate() * 100.0);
    Ok(())
}
