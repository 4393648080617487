//! Plugin source helpers.

use std::path::{Component, Path, PathBuf};

pub use kadai_config::PluginSource;

/// Namespace for a plugin's actions: the npm package, the GitHub `owner/repo`,
/// or the last component of a local path.
pub fn plugin_display_name(source: &PluginSource) -> String {
    match source {
        PluginSource::Npm { package, .. } => package.clone(),
        PluginSource::Github { repo, .. } => repo.trim_end_matches(".git").to_string(),
        PluginSource::Path { path } => path
            .file_name()
            .or_else(|| path.components().next_back().map(|c| c.as_os_str()))
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    }
}

/// Resolve a path source against `root` when it is relative.
///
/// `.` and `..` components are folded lexically so the result does not
/// depend on intermediate directories existing.
pub fn resolve_path_source(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                },
                Some(Component::RootDir | Component::Prefix(_)) => {},
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Last `depth` normal components of `path`, joined with `/`.
fn tail(path: &Path, depth: usize) -> Option<String> {
    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(n) => Some(n.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (parts.len() >= depth).then(|| parts[parts.len() - depth..].join("/"))
}

/// Namespace for every entry of `sources`, index-aligned.
///
/// Repeated sources (and path sources resolving to the same directory) get
/// `None` so they load once. Path sources whose last component clashes with
/// another plugin widen to `parent/name`; anything still clashing gets a
/// `~2`, `~3`, ... suffix in declaration order.
pub fn plugin_namespaces(root: &Path, sources: &[PluginSource]) -> Vec<Option<String>> {
    let resolved: Vec<Option<PathBuf>> = sources
        .iter()
        .map(|s| match s {
            PluginSource::Path { path } => Some(resolve_path_source(root, path)),
            _ => None,
        })
        .collect();
    let duplicate = |i: usize| {
        (0..i).any(|j| match (&resolved[i], &resolved[j]) {
            (Some(a), Some(b)) => a == b,
            (None, None) => sources[i] == sources[j],
            _ => false,
        })
    };

    let base: Vec<String> = sources
        .iter()
        .zip(&resolved)
        .map(|(s, r)| match r {
            Some(dir) => tail(dir, 1).unwrap_or_else(|| plugin_display_name(s)),
            None => plugin_display_name(s),
        })
        .collect();
    let kept: Vec<usize> = (0..sources.len()).filter(|&i| !duplicate(i)).collect();

    let mut names: Vec<Option<String>> = vec![None; sources.len()];
    for &i in &kept {
        let clashes = kept.iter().any(|&j| j != i && base[j] == base[i]);
        let name = match (&resolved[i], clashes) {
            (Some(dir), true) => tail(dir, 2).unwrap_or_else(|| base[i].clone()),
            _ => base[i].clone(),
        };
        names[i] = Some(name);
    }

    let mut taken: Vec<String> = Vec::new();
    for &i in &kept {
        let Some(name) = names[i].take() else {
            continue;
        };
        let mut unique = name.clone();
        let mut n = 2;
        while taken.contains(&unique) {
            unique = format!("{name}~{n}");
            n += 1;
        }
        taken.push(unique.clone());
        names[i] = Some(unique);
    }
    names
}
