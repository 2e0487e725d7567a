//! Script registry: the `registry.json` data model, metadata validation,
//! mechanical fix-up, and a hash-checked cached reader.

pub mod fixup;
pub mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheStats, LruCache};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Script category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Analysis,
    Data,
    Validation,
    Generation,
    Integration,
    Monitoring,
    Core,
    Utility,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Analysis,
        Category::Data,
        Category::Validation,
        Category::Generation,
        Category::Integration,
        Category::Monitoring,
        Category::Core,
        Category::Utility,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Analysis => "analysis",
            Category::Data => "data",
            Category::Validation => "validation",
            Category::Generation => "generation",
            Category::Integration => "integration",
            Category::Monitoring => "monitoring",
            Category::Core => "core",
            Category::Utility => "utility",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid category: {0}")]
pub struct CategoryParseError(pub String);

impl FromStr for Category {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(Category::Analysis),
            "data" => Ok(Category::Data),
            "validation" => Ok(Category::Validation),
            "generation" => Ok(Category::Generation),
            "integration" => Ok(Category::Integration),
            "monitoring" => Ok(Category::Monitoring),
            "core" => Ok(Category::Core),
            "utility" => Ok(Category::Utility),
            other => Err(CategoryParseError(other.to_string())),
        }
    }
}

/// Declared type of a script argument or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    File,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgType::String => "string",
            ArgType::Number => "number",
            ArgType::Boolean => "boolean",
            ArgType::Array => "array",
            ArgType::Object => "object",
            ArgType::File => "file",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument type: {0}")]
pub struct ArgTypeParseError(pub String);

impl FromStr for ArgType {
    type Err = ArgTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ArgType::String),
            "number" => Ok(ArgType::Number),
            "boolean" => Ok(ArgType::Boolean),
            "array" => Ok(ArgType::Array),
            "object" => Ok(ArgType::Object),
            "file" => Ok(ArgType::File),
            other => Err(ArgTypeParseError(other.to_string())),
        }
    }
}

/// Sandbox level in the security block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxLevel {
    None,
    Minimal,
    Standard,
    Strict,
}

impl fmt::Display for SandboxLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxLevel::None => "none",
            SandboxLevel::Minimal => "minimal",
            SandboxLevel::Standard => "standard",
            SandboxLevel::Strict => "strict",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sandbox level: {0}")]
pub struct SandboxLevelParseError(pub String);

impl FromStr for SandboxLevel {
    type Err = SandboxLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SandboxLevel::None),
            "minimal" => Ok(SandboxLevel::Minimal),
            "standard" => Ok(SandboxLevel::Standard),
            "strict" => Ok(SandboxLevel::Strict),
            other => Err(SandboxLevelParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry document
// ---------------------------------------------------------------------------

/// The whole `registry.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub scripts: Vec<ScriptEntry>,
}

/// One script's metadata.
///
/// Fields the validator checks are kept as raw `Option<String>` so that a
/// malformed registry still deserializes and every problem can be reported;
/// unknown top-level keys land in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<OutputSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialists: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// How the script is invoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Execution {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_json::Value>,
}

/// One declared script argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub arg_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One declared script output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// Security block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Security {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_access: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpu: Option<serde_json::Value>,
}

impl Registry {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse registry JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read registry at {}", path.display()))?;
        Self::from_json(&content)
    }
}

// ---------------------------------------------------------------------------
// Cached reader
// ---------------------------------------------------------------------------

struct LoadedRegistry {
    registry: Registry,
    content_hash: String,
}

/// Cached view over a `registry.json` file.
///
/// Lookups go through an LRU cache; the backing file is re-hashed on each
/// lookup and reloaded (cache cleared) when its SHA-256 changes.
pub struct RegistryCache {
    path: PathBuf,
    loaded: Mutex<LoadedRegistry>,
    cache: LruCache<String, CachedValue>,
}

#[derive(Clone)]
enum CachedValue {
    Script(Box<ScriptEntry>),
    Scripts(Vec<ScriptEntry>),
}

impl RegistryCache {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(path, CacheConfig::default())
    }

    pub fn open_with_config(path: impl Into<PathBuf>, config: CacheConfig) -> Result<Self> {
        let path = path.into();
        let (registry, content_hash) = load_hashed(&path)?;
        info!(
            registry = %path.display(),
            scripts = registry.scripts.len(),
            "registry loaded"
        );
        Ok(Self {
            path,
            loaded: Mutex::new(LoadedRegistry {
                registry,
                content_hash,
            }),
            cache: LruCache::new(config),
        })
    }

    /// Look up one script by its `category/name` id.
    pub fn script(&self, id: &str) -> Result<Option<ScriptEntry>> {
        self.reload_if_changed()?;

        let key = format!("script:{id}");
        if let Some(CachedValue::Script(entry)) = self.cache.get(&key) {
            return Ok(Some(*entry));
        }

        let found = self.with_registry(|registry| {
            registry
                .scripts
                .iter()
                .find(|s| s.id.as_deref() == Some(id))
                .cloned()
        });
        if let Some(entry) = &found {
            self.cache
                .insert(key, CachedValue::Script(Box::new(entry.clone())), entry_cost(entry));
        }
        Ok(found)
    }

    /// All scripts that list the given specialist.
    pub fn scripts_by_specialist(&self, specialist: &str) -> Result<Vec<ScriptEntry>> {
        self.reload_if_changed()?;

        let key = format!("specialist:{specialist}");
        if let Some(CachedValue::Scripts(entries)) = self.cache.get(&key) {
            return Ok(entries);
        }

        let entries = self.with_registry(|registry| {
            registry
                .scripts
                .iter()
                .filter(|s| s.specialists.iter().any(|sp| sp == specialist))
                .cloned()
                .collect::<Vec<_>>()
        });
        let cost = entries.iter().map(entry_cost).sum();
        self.cache
            .insert(key, CachedValue::Scripts(entries.clone()), cost);
        Ok(entries)
    }

    /// A snapshot of every script in the registry.
    pub fn all_scripts(&self) -> Result<Vec<ScriptEntry>> {
        self.reload_if_changed()?;
        Ok(self.with_registry(|registry| registry.scripts.clone()))
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Re-hash the backing file and reload it when the content changed.
    fn reload_if_changed(&self) -> Result<()> {
        let current = hash_file(&self.path)?;
        let mut loaded = self
            .loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if loaded.content_hash == current {
            return Ok(());
        }

        debug!(registry = %self.path.display(), "registry changed on disk, reloading");
        let (registry, content_hash) = load_hashed(&self.path)?;
        loaded.registry = registry;
        loaded.content_hash = content_hash;
        self.cache.clear();
        Ok(())
    }

    fn with_registry<T>(&self, f: impl FnOnce(&Registry) -> T) -> T {
        let loaded = self
            .loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&loaded.registry)
    }
}

/// Default cache tuning for registry reads.
pub fn registry_cache_config() -> CacheConfig {
    CacheConfig {
        max_entries: 256,
        max_bytes: 100 * 1024 * 1024,
        default_ttl: Duration::from_secs(600),
    }
}

fn entry_cost(entry: &ScriptEntry) -> usize {
    serde_json::to_string(entry).map(|s| s.len()).unwrap_or(0)
}

fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read registry at {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&content)))
}

fn load_hashed(path: &Path) -> Result<(Registry, String)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read registry at {}", path.display()))?;
    let registry = Registry::from_json(&content)?;
    Ok((registry, hex::encode(Sha256::digest(content.as_bytes()))))
}
