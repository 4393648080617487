//! On-disk plugin cache: slot layout, metadata and namespaced loading.
//!
//! ```text
//! <root>/.cache/.gitignore                      "*"
//! <root>/.cache/plugins/<kind>/<name>@<ver>/    one slot per source
//!     .plugin-meta.json
//!     actions/...
//! ```

use std::path::{Path, PathBuf};

use {
    chrono::{DateTime, Utc},
    kadai_actions::{Action, LoadOptions, Origin, load_actions_with},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::Result,
    source::{PluginSource, plugin_namespaces, resolve_path_source},
};

/// Metadata file written into every populated slot.
pub const META_FILE: &str = ".plugin-meta.json";

/// Persisted record of the last successful fetch of a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMeta {
    pub fetched_at: DateTime<Utc>,
    pub source: PluginSource,
    /// Concrete semver or commit SHA.
    pub resolved_version: String,
}

pub fn plugins_cache_dir(root: &Path) -> PathBuf {
    root.join(".cache").join("plugins")
}

/// Create the plugin cache directory and its `.gitignore`. Idempotent.
pub fn ensure_cache_dir(root: &Path) -> Result<PathBuf> {
    let plugins = plugins_cache_dir(root);
    std::fs::create_dir_all(&plugins)?;
    let gitignore = root.join(".cache").join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, "*\n")?;
    }
    Ok(plugins)
}

fn escape_name(name: &str) -> String {
    name.replace(['/', '\\'], "__")
}

/// `<kind>/<escaped-name>@<version-or-ref>` for remote sources.
pub fn cache_key_for(source: &PluginSource) -> Option<String> {
    let (name, version) = match source {
        PluginSource::Npm { package, version } => {
            (package, version.as_deref().unwrap_or("latest"))
        },
        PluginSource::Github { repo, git_ref } => (repo, git_ref.as_deref().unwrap_or("HEAD")),
        PluginSource::Path { .. } => return None,
    };
    Some(format!(
        "{}/{}@{}",
        source.kind(),
        escape_name(name),
        escape_name(version)
    ))
}

/// Slot directory for `source`; `None` for path sources.
pub fn slot_dir(root: &Path, source: &PluginSource) -> Option<PathBuf> {
    cache_key_for(source).map(|key| plugins_cache_dir(root).join(key))
}

/// Read a slot's metadata. Missing or malformed files yield `None`.
pub fn read_plugin_meta(slot: &Path) -> Option<PluginMeta> {
    let path = slot.join(META_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed plugin metadata");
            None
        },
    }
}

/// Write a slot's metadata atomically via temp file + rename.
pub fn write_plugin_meta(slot: &Path, meta: &PluginMeta) -> Result<()> {
    std::fs::create_dir_all(slot)?;
    let path = slot.join(META_FILE);
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(meta)?;
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Load every plugin's actions with default options.
pub fn load_cached_plugins(root: &Path, sources: &[PluginSource]) -> Vec<Action> {
    load_cached_plugins_with(root, sources, &LoadOptions::default())
}

/// Load actions for each source, namespaced by plugin name.
///
/// Names come from [`plugin_namespaces`], so two plugins never share a
/// namespace and a repeated source is loaded once.
///
/// Remote sources read `<slot>/actions`; sources never synced contribute
/// nothing. Path sources are read live from `<path>/actions`, or `<path>`
/// itself when it has no `actions` directory.
pub fn load_cached_plugins_with(
    root: &Path,
    sources: &[PluginSource],
    opts: &LoadOptions,
) -> Vec<Action> {
    let mut all = Vec::new();
    let names = plugin_namespaces(root, sources);
    for (source, name) in sources.iter().zip(names) {
        let Some(name) = name else {
            debug!(source = ?source, "skipping repeated plugin source");
            continue;
        };
        let dir = match source {
            PluginSource::Path { path } => {
                let base = resolve_path_source(root, path);
                let nested = base.join("actions");
                if nested.is_dir() { nested } else { base }
            },
            remote => match slot_dir(root, remote) {
                Some(slot) => slot.join("actions"),
                None => continue,
            },
        };
        if !dir.is_dir() {
            debug!(plugin = %name, dir = %dir.display(), "plugin has no actions directory yet");
            continue;
        }
        let origin = Origin::Plugin { name: name.clone() };
        let actions = load_actions_with(&dir, &origin, opts);
        debug!(plugin = %name, count = actions.len(), "loaded plugin actions");
        all.extend(actions.into_iter().map(|a| a.namespaced(&name)));
    }
    all
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn npm(package: &str, version: Option<&str>) -> PluginSource {
        PluginSource::Npm {
            package: package.into(),
            version: version.map(str::to_string),
        }
    }

    fn write_action(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn cache_keys_are_deterministic_and_versioned() {
        let a = npm("@org/pkg", Some("1.0.0"));
        let b = npm("@org/pkg", Some("2.0.0"));
        assert_eq!(cache_key_for(&a), cache_key_for(&a.clone()));
        assert_eq!(cache_key_for(&a).unwrap(), "npm/@org__pkg@1.0.0");
        assert_ne!(cache_key_for(&a), cache_key_for(&b));
        assert_eq!(cache_key_for(&npm("tasks", None)).unwrap(), "npm/tasks@latest");
    }

    #[test]
    fn github_keys_default_to_head() {
        let gh = PluginSource::Github {
            repo: "acme/ops".into(),
            git_ref: None,
        };
        assert_eq!(cache_key_for(&gh).unwrap(), "github/acme__ops@HEAD");
        let pinned = PluginSource::Github {
            repo: "acme/ops".into(),
            git_ref: Some("release/v2".into()),
        };
        assert_eq!(cache_key_for(&pinned).unwrap(), "github/acme__ops@release__v2");
        let local = PluginSource::Path {
            path: "x".into(),
        };
        assert_eq!(cache_key_for(&local), None);
    }

    #[test]
    fn ensure_cache_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_cache_dir(tmp.path()).unwrap();
        ensure_cache_dir(tmp.path()).unwrap();
        let gitignore = tmp.path().join(".cache/.gitignore");
        assert_eq!(std::fs::read_to_string(gitignore).unwrap(), "*\n");
        assert!(plugins_cache_dir(tmp.path()).is_dir());
    }

    #[test]
    fn meta_round_trip_and_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let slot = tmp.path().join("slot");
        assert!(read_plugin_meta(&slot).is_none());

        let meta = PluginMeta {
            fetched_at: Utc::now(),
            source: npm("tasks", Some("^1")),
            resolved_version: "1.2.0".into(),
        };
        write_plugin_meta(&slot, &meta).unwrap();
        assert_eq!(read_plugin_meta(&slot), Some(meta));

        let raw = std::fs::read_to_string(slot.join(META_FILE)).unwrap();
        assert!(raw.contains("\"resolvedVersion\""));
        assert!(raw.contains("\"fetchedAt\""));
        assert!(!slot.join(".plugin-meta.json.tmp").exists());

        std::fs::write(slot.join(META_FILE), "{ nope").unwrap();
        assert!(read_plugin_meta(&slot).is_none());
    }

    #[test]
    fn same_named_actions_are_namespaced_per_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let a = npm("alpha", None);
        let b = PluginSource::Github {
            repo: "acme/beta".into(),
            git_ref: None,
        };
        for source in [&a, &b] {
            let slot = slot_dir(root, source).unwrap();
            write_action(&slot, "actions/deploy.sh", "echo deploy\n");
        }

        let actions = load_cached_plugins(root, &[a, b]);
        let mut ids: Vec<_> = actions.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["acme/beta:deploy", "alpha:deploy"]);

        let alpha = actions.iter().find(|a| a.id == "alpha:deploy").unwrap();
        assert_eq!(alpha.category, vec!["alpha".to_string()]);
        assert_eq!(alpha.origin, Origin::Plugin {
            name: "alpha".into()
        });
    }

    #[test]
    fn path_sources_load_live_relative_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".kadai");
        write_action(&tmp.path().join("shared"), "actions/db/reset.sh", "echo\n");
        let source = PluginSource::Path {
            path: "../shared".into(),
        };

        let actions = load_cached_plugins(&root, &[source]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "shared:db/reset");
        assert_eq!(actions[0].category, vec!["shared".to_string(), "db".into()]);
    }

    #[test]
    fn same_named_path_sources_keep_distinct_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".kadai");
        write_action(&tmp.path().join("web/scripts"), "actions/hello.sh", "echo web\n");
        write_action(&tmp.path().join("ops/scripts"), "actions/hello.sh", "echo ops\n");
        let sources = [
            PluginSource::Path {
                path: "../web/scripts".into(),
            },
            PluginSource::Path {
                path: "../ops/scripts".into(),
            },
            PluginSource::Path {
                path: "../web/./scripts".into(),
            },
        ];

        let actions = load_cached_plugins(&root, &sources);
        let mut ids: Vec<_> = actions.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["ops/scripts:hello", "web/scripts:hello"]);
    }

    #[test]
    fn unsynced_sources_contribute_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_cached_plugins(tmp.path(), &[npm("tasks", None)]).is_empty());
    }
}
