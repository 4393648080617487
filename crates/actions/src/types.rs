use std::{
    fmt,
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Runtime ─────────────────────────────────────────────────────────────────

/// Execution runtime inferred from a script's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Bun,
    Node,
    Bash,
    Zsh,
    Python,
    /// Extension-less file with an executable bit; run directly.
    Executable,
}

impl Runtime {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" | "tsx" => Some(Self::Bun),
            "js" | "mjs" | "cjs" => Some(Self::Node),
            "sh" | "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "py" => Some(Self::Python),
            _ => None,
        }
    }

    /// Infer the runtime for a file. Extension-less files qualify only when
    /// `executable` is set.
    pub fn detect(path: &Path, executable: bool) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None if executable => Some(Self::Executable),
            None => None,
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bun => "bun",
            Self::Node => "node",
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Python => "python",
            Self::Executable => "executable",
        };
        f.write_str(s)
    }
}

// ── Origin ──────────────────────────────────────────────────────────────────

/// Where an action was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Origin {
    /// Project-local: `<project>/.kadai/actions/`
    Local,
    /// User-global: `~/.kadai/actions/`
    Global,
    /// Shipped by a plugin source.
    Plugin { name: String },
}

// ── Action ──────────────────────────────────────────────────────────────────

/// Metadata parsed from `kadai:` frontmatter, with a filename-derived name
/// when none is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ask before running.
    #[serde(default)]
    pub confirm: bool,
    /// Omit from listings; still runnable by id.
    #[serde(default)]
    pub hidden: bool,
    /// Needs the terminal (stdin attached).
    #[serde(default)]
    pub interactive: bool,
}

/// A discovered, runnable script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// `<category>/<basename>`; plugin actions are prefixed `<plugin>:`.
    pub id: String,
    pub meta: ActionMeta,
    pub file_path: PathBuf,
    pub category: Vec<String>,
    pub runtime: Runtime,
    /// Interpreter line without the leading `#!`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shebang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    pub origin: Origin,
}

impl Action {
    /// Re-home this action under a plugin namespace.
    pub fn namespaced(mut self, plugin: &str) -> Self {
        self.id = format!("{plugin}:{}", self.id);
        self.category.insert(0, plugin.to_string());
        self.origin = Origin::Plugin {
            name: plugin.to_string(),
        };
        self
    }
}
