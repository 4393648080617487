/// Config schema types (plugins, sync, action discovery).
use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KadaiConfig {
    /// External plugin sources whose actions are merged with local ones.
    pub plugins: Vec<PluginSource>,
    pub sync: SyncConfig,
    pub actions: ActionsConfig,
}

/// Plugin synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-plugin budget for one sync pass, in seconds.
    pub timeout_secs: u64,
    pub registry_url: String,
    pub github_base_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            registry_url: "https://registry.npmjs.org".into(),
            github_base_url: "https://github.com".into(),
        }
    }
}

/// Action discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Maximum directory nesting scanned below an actions root.
    pub max_depth: usize,
    /// Assign `added_at` from git history.
    pub added_at: bool,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            added_at: true,
        }
    }
}

// ── Plugin sources ──────────────────────────────────────────────────────────

/// A declared external origin for actions.
///
/// Serialized as an object carrying exactly one of `npm`, `github` or `path`:
///
/// ```toml
/// plugins = [
///   { npm = "@acme/tasks", version = "^1.2.0" },
///   { github = "acme/scripts", ref = "main" },
///   { path = "../shared-actions" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPluginSource", into = "RawPluginSource")]
pub enum PluginSource {
    Npm {
        package: String,
        version: Option<String>,
    },
    Github {
        repo: String,
        git_ref: Option<String>,
    },
    Path {
        path: PathBuf,
    },
}

impl PluginSource {
    /// Cache directory bucket for this source kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Npm { .. } => "npm",
            Self::Github { .. } => "github",
            Self::Path { .. } => "path",
        }
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm { package, version } => match version {
                Some(v) => write!(f, "npm:{package}@{v}"),
                None => write!(f, "npm:{package}"),
            },
            Self::Github { repo, git_ref } => match git_ref {
                Some(r) => write!(f, "github:{repo}#{r}"),
                None => write!(f, "github:{repo}"),
            },
            Self::Path { path } => write!(f, "path:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPluginSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    npm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

impl TryFrom<RawPluginSource> for PluginSource {
    type Error = String;

    fn try_from(raw: RawPluginSource) -> Result<Self, Self::Error> {
        match (raw.npm, raw.github, raw.path) {
            (Some(package), None, None) if raw.git_ref.is_none() => {
                if package.trim().is_empty() {
                    return Err("npm plugin source has an empty package name".into());
                }
                Ok(Self::Npm {
                    package,
                    version: raw.version.filter(|v| !v.trim().is_empty()),
                })
            },
            (None, Some(repo), None) if raw.version.is_none() => {
                let mut parts = repo.split('/');
                let valid = matches!(
                    (parts.next(), parts.next(), parts.next()),
                    (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
                );
                if !valid {
                    return Err(format!(
                        "invalid github plugin source '{repo}': expected 'owner/repo'"
                    ));
                }
                Ok(Self::Github {
                    repo,
                    git_ref: raw.git_ref.filter(|r| !r.trim().is_empty()),
                })
            },
            (None, None, Some(path)) if raw.version.is_none() && raw.git_ref.is_none() => {
                Ok(Self::Path { path })
            },
            _ => Err(
                "plugin source must set exactly one of `npm`, `github` or `path` \
                 (`version` only with npm, `ref` only with github)"
                    .into(),
            ),
        }
    }
}

impl From<PluginSource> for RawPluginSource {
    fn from(source: PluginSource) -> Self {
        match source {
            PluginSource::Npm { package, version } => Self {
                npm: Some(package),
                version,
                ..Default::default()
            },
            PluginSource::Github { repo, git_ref } => Self {
                github: Some(repo),
                git_ref,
                ..Default::default()
            },
            PluginSource::Path { path } => Self {
                path: Some(path),
                ..Default::default()
            },
        }
    }
}
