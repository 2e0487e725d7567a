use std::env;
use std::path::{Path, PathBuf};

/// Store configuration.
///
/// Reads from the `MAGPIE_DATA_DIR` environment variable, falling back to
/// `~/.local/share/magpie` when unset.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for all persisted records.
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// Build a config from the environment.
    ///
    /// Priority: `MAGPIE_DATA_DIR` env var, then `$XDG_DATA_HOME/magpie`,
    /// then `~/.local/share/magpie`.
    pub fn from_env() -> Self {
        if let Ok(dir) = env::var("MAGPIE_DATA_DIR") {
            return Self {
                data_dir: PathBuf::from(dir),
            };
        }
        Self {
            data_dir: Self::default_data_dir(),
        }
    }

    /// Build a config from an explicit directory (useful for tests and CLI
    /// flags).
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The default data directory used when nothing else is configured.
    ///
    /// Always uses XDG layout: `$XDG_DATA_HOME/magpie` or
    /// `~/.local/share/magpie`.
    pub fn default_data_dir() -> PathBuf {
        if let Ok(xdg) = env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("magpie");
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local")
            .join("share")
            .join("magpie")
    }

    /// Directory holding job records.
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    /// Directory holding workflow run records.
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_new() {
        let cfg = StoreConfig::new("/tmp/magpie-data");
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/magpie-data"));
    }

    #[test]
    fn subdirectories_hang_off_root() {
        let cfg = StoreConfig::new("/tmp/magpie-data");
        assert_eq!(cfg.jobs_dir(), PathBuf::from("/tmp/magpie-data/jobs"));
        assert_eq!(cfg.runs_dir(), PathBuf::from("/tmp/magpie-data/runs"));
    }

    #[test]
    fn default_dir_ends_with_magpie() {
        let dir = StoreConfig::default_data_dir();
        assert!(
            dir.ends_with("magpie"),
            "unexpected default data dir: {}",
            dir.display()
        );
    }
}
