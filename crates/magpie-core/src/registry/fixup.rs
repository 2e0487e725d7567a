//! Mechanical fixes for common metadata mistakes.

use super::{Security, ScriptEntry};

/// Apply the safe, mechanical fixes and report which ones were used.
/// Anything judgement-based stays a validation finding instead.
pub fn auto_fix(entry: &ScriptEntry) -> (ScriptEntry, Vec<String>) {
    let mut fixed = entry.clone();
    let mut applied = Vec::new();

    let id_needs_fix = match &fixed.id {
        None => true,
        Some(id) => !id.contains('/'),
    };
    if id_needs_fix {
        if let (Some(category), Some(name)) = (&fixed.category, &fixed.name) {
            if !category.is_empty() && !name.is_empty() {
                fixed.id = Some(format!("{category}/{name}"));
                applied.push("generated id from category and name".to_string());
            }
        }
    }

    if let Some(path) = &fixed.path {
        if !path.is_empty() && !path.starts_with("scripts/") {
            fixed.path = Some(format!("scripts/{path}"));
            applied.push("added 'scripts/' prefix to path".to_string());
        }
    }

    if fixed.version.is_none() {
        fixed.version = Some("1.0.0".to_string());
        applied.push("added default version 1.0.0".to_string());
    }

    if fixed.security.is_none() {
        fixed.security = Some(Security {
            sandbox: Some("minimal".to_string()),
            max_memory: Some("512MB".to_string()),
            network_access: Some(false),
            ..Default::default()
        });
        applied.push("added default security configuration".to_string());
    }

    if fixed.outputs.is_none() {
        fixed.outputs = Some(Vec::new());
        applied.push("added empty outputs array".to_string());
    }

    (fixed, applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_id_from_category_and_name() {
        let entry = ScriptEntry {
            name: Some("csv-parse".to_string()),
            category: Some("data".to_string()),
            ..Default::default()
        };
        let (fixed, applied) = auto_fix(&entry);
        assert_eq!(fixed.id.as_deref(), Some("data/csv-parse"));
        assert!(applied.iter().any(|f| f.contains("generated id")));
    }

    #[test]
    fn prefixes_bare_path() {
        let entry = ScriptEntry {
            path: Some("data/csv-parse.py".to_string()),
            ..Default::default()
        };
        let (fixed, _) = auto_fix(&entry);
        assert_eq!(fixed.path.as_deref(), Some("scripts/data/csv-parse.py"));
    }

    #[test]
    fn defaults_version_security_and_outputs() {
        let (fixed, applied) = auto_fix(&ScriptEntry::default());
        assert_eq!(fixed.version.as_deref(), Some("1.0.0"));
        let security = fixed.security.expect("security should be defaulted");
        assert_eq!(security.sandbox.as_deref(), Some("minimal"));
        assert!(fixed.outputs.is_some_and(|o| o.is_empty()));
        assert_eq!(applied.len(), 3);
    }

    #[test]
    fn leaves_well_formed_entries_alone() {
        let entry = ScriptEntry {
            id: Some("data/csv-parse".to_string()),
            name: Some("csv-parse".to_string()),
            category: Some("data".to_string()),
            path: Some("scripts/data/csv-parse.py".to_string()),
            version: Some("2.0.0".to_string()),
            security: Some(Security::default()),
            outputs: Some(Vec::new()),
            ..Default::default()
        };
        let (fixed, applied) = auto_fix(&entry);
        assert!(applied.is_empty());
        assert_eq!(fixed.id, entry.id);
        assert_eq!(fixed.path, entry.path);
    }
}
