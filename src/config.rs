//! Configuration.
//!
//! RepoKeeper reads a single TOML file of personal, per-machine settings
//! (scan roots, safety policy, concurrency). It is not checked into any
//! repository. Default location:
//!
//! - Linux/macOS: `~/.config/repokeeper/config.toml`
//! - Windows: `%APPDATA%\repokeeper\config.toml`
//!
//! Override with `--config` or the `REPOKEEPER_CONFIG` environment variable.
//!
//! ```toml
//! roots = ["~/work", "~/src"]
//! exclude = ["**/node_modules", "scratch"]
//! concurrency = 8
//! timeout-seconds = 120
//! protected-branches = ["main", "release/*"]
//! backends = ["git", "hg"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KeeperConfig {
    /// Directories scanned for repositories. `~` and environment variables
    /// are expanded.
    pub roots: Vec<String>,

    /// Gitignore-style globs pruned from discovery.
    pub exclude: Vec<String>,

    /// Follow symlinks while scanning.
    pub follow_symlinks: bool,

    /// Worker pool size for status/sync fan-out.
    pub concurrency: usize,

    /// Per-repo deadline in seconds; 0 disables the deadline.
    pub timeout_seconds: u64,

    /// Branch globs that refuse rebase unless explicitly allowed.
    pub protected_branches: Vec<String>,

    /// Enabled backends, in priority order. The first one receives clones.
    pub backends: Vec<String>,

    /// Registry file location; defaults to the platform state directory.
    pub registry_path: Option<String>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            concurrency: DEFAULT_CONCURRENCY,
            timeout_seconds: 0,
            protected_branches: Vec::new(),
            backends: vec!["git".to_string()],
            registry_path: None,
        }
    }
}

impl KeeperConfig {
    /// Load from `path`, or from the default location when `path` is None.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os("REPOKEEPER_CONFIG") {
                Some(env_path) => PathBuf::from(env_path),
                None => match default_config_path() {
                    Some(path) => path,
                    None => return Ok(Self::default()),
                },
            },
        };

        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let config: Self = toml::from_str(&data)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if config.backends.is_empty() {
            bail!("config {}: `backends` must not be empty", path.display());
        }
        Ok(config)
    }

    /// Roots with `~`/env expansion applied.
    pub fn expanded_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|r| PathBuf::from(shellexpand::tilde(r).into_owned()))
            .collect()
    }

    /// Effective registry location.
    pub fn registry_path(&self) -> PathBuf {
        if let Some(path) = &self.registry_path {
            return PathBuf::from(shellexpand::tilde(path).into_owned());
        }
        default_state_dir().join("registry.json")
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("repokeeper").join("config.toml"))
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repokeeper")
}
