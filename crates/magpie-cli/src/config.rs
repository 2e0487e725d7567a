//! Configuration file management for magpie.
//!
//! Provides a TOML-based config file at `~/.config/magpie/config.toml` and a
//! resolution chain for the data directory:
//! CLI flag > `MAGPIE_DATA_DIR` env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use magpie_store::config::StoreConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub data: DataSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataSection {
    /// Directory for jobs, runs, and the default registry location.
    pub dir: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the magpie config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/magpie` or `~/.config/magpie`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("magpie");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("magpie")
}

/// Return the path to the magpie config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Resolve the data directory using the chain:
/// CLI flag > `MAGPIE_DATA_DIR` env > config file > default.
pub fn resolve_store(cli_data_dir: Option<&str>) -> StoreConfig {
    if let Some(dir) = cli_data_dir {
        return StoreConfig::new(dir);
    }
    if let Ok(dir) = std::env::var("MAGPIE_DATA_DIR") {
        return StoreConfig::new(dir);
    }
    if let Ok(cfg) = load_config() {
        return StoreConfig::new(cfg.data.dir);
    }
    StoreConfig::default()
}

/// The registry file the `registry` commands operate on by default.
pub fn default_registry_path(store: &StoreConfig) -> PathBuf {
    store.root().join("registry.json")
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("magpie/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }

    #[test]
    fn cli_flag_overrides_everything() {
        let store = resolve_store(Some("/tmp/magpie-cli-test"));
        assert_eq!(store.root(), std::path::Path::new("/tmp/magpie-cli-test"));
    }

    #[test]
    fn config_file_roundtrips_through_toml() {
        let original = ConfigFile {
            data: DataSection {
                dir: "/var/lib/magpie".to_string(),
            },
        };
        let rendered = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&rendered).unwrap();
        assert_eq!(loaded.data.dir, original.data.dir);
    }

    #[test]
    fn default_registry_lives_under_the_data_dir() {
        let store = StoreConfig::new("/data/magpie");
        assert_eq!(
            default_registry_path(&store),
            PathBuf::from("/data/magpie/registry.json")
        );
    }
}
