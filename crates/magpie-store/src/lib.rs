//! File-backed persistence for magpie.
//!
//! Jobs and workflow runs are stored as one JSON document per record under
//! the data directory (`jobs/<uuid>.json`, `runs/<id>.json`). Writes go
//! through a temp-file-and-rename sequence so a crash never leaves a
//! half-written record behind.

pub mod config;
pub mod jobs;
pub mod models;
pub mod runs;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize `value` as pretty JSON and atomically write it to `path`.
///
/// The document is first written to `<path>.tmp` in the same directory and
/// then renamed over the target, so readers only ever observe complete
/// records.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("record path {} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create store directory {}", parent.display()))?;

    let contents =
        serde_json::to_string_pretty(value).context("failed to serialize store record")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &contents)
        .with_context(|| format!("failed to write temp record {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move record into place at {}", path.display()))?;

    Ok(())
}

/// Read and deserialize a JSON record from `path`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read record {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse record {}", path.display()))?;
    Ok(value)
}
