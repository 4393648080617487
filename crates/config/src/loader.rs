use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Context, Error, Result},
    schema::{KadaiConfig, PluginSource},
};

/// Standard config file names inside `.kadai/`, checked in order.
const CONFIG_FILENAMES: &[&str] = &["config.toml", "config.yaml", "config.yml", "config.json"];

/// Directory name holding project actions and the plugin cache.
pub const KADAI_DIR: &str = ".kadai";

/// Well-known locations for one invocation.
///
/// Resolved once at startup and passed by reference to loaders and the
/// sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KadaiPaths {
    /// Directory the user invoked kadai from (or an ancestor holding `.kadai`).
    pub project_root: PathBuf,
    /// `<project_root>/.kadai`, also the plugin cache root.
    pub kadai_dir: PathBuf,
    /// User-global `~/.kadai`, if a home directory is known.
    pub global_dir: Option<PathBuf>,
}

impl KadaiPaths {
    pub fn new(project_root: impl Into<PathBuf>, global_dir: Option<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            kadai_dir: project_root.join(KADAI_DIR),
            project_root,
            global_dir,
        }
    }

    /// Walk up from `cwd` to the nearest directory containing `.kadai`.
    /// Falls back to `cwd` itself.
    pub fn discover(cwd: &Path) -> Self {
        let root = cwd
            .ancestors()
            .find(|dir| dir.join(KADAI_DIR).is_dir())
            .unwrap_or(cwd);
        Self::new(root, default_global_dir())
    }

    pub fn actions_dir(&self) -> PathBuf {
        self.kadai_dir.join("actions")
    }

    pub fn global_actions_dir(&self) -> Option<PathBuf> {
        self.global_dir.as_ref().map(|d| d.join("actions"))
    }
}

/// `~/.kadai`, derived from the platform home directory.
pub fn default_global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(KADAI_DIR))
}

/// Find the first config file inside `kadai_dir`.
pub fn find_config_file(kadai_dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| kadai_dir.join(name))
        .find(|p| p.is_file())
}

/// Load config from the given path (any supported format).
///
/// Relative `path` plugin sources are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<KadaiConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut config = parse_config(&raw, path)?;
    if let Some(base) = path.parent() {
        resolve_plugin_paths(&mut config, base);
    }
    Ok(config)
}

/// Discover and load `.kadai/config.*` for the given paths.
///
/// Returns `KadaiConfig::default()` if no config file is found or it fails
/// to parse.
pub fn discover_and_load(paths: &KadaiPaths) -> KadaiConfig {
    if let Some(path) = find_config_file(&paths.kadai_dir) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!(dir = %paths.kadai_dir.display(), "no config file found, using defaults");
    }
    KadaiConfig::default()
}

fn parse_config(raw: &str, path: &Path) -> Result<KadaiConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::unsupported_format(path)),
    }
}

fn resolve_plugin_paths(config: &mut KadaiConfig, base: &Path) {
    for source in &mut config.plugins {
        if let PluginSource::Path { path } = source
            && path.is_relative()
        {
            *path = base.join(&*path);
        }
    }
}
