use std::{collections::HashSet, ffi::OsStr, path::Path};

use {
    tracing::debug,
    walkdir::{DirEntry, WalkDir},
};

use crate::{
    frontmatter::{extract_metadata, read_header},
    history,
    types::{Action, Origin, Runtime},
};

/// Default maximum nesting below an actions root. Root-level files are
/// depth 1, so at most three category segments are produced.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Knobs for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub max_depth: usize,
    /// Query git once for `added_at` dates.
    pub added_at: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            added_at: false,
        }
    }
}

/// Scan `dir` for actions with default options.
pub fn load_actions(dir: &Path, origin: &Origin) -> Vec<Action> {
    load_actions_with(dir, origin, &LoadOptions::default())
}

/// Recursively scan `dir` for actions, sorted by display name.
///
/// Entries starting with `_` or `.` are skipped, and unreadable files or
/// directories are ignored.
pub fn load_actions_with(dir: &Path, origin: &Origin, opts: &LoadOptions) -> Vec<Action> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let dates = if opts.added_at {
        history::added_dates(dir)
    } else {
        Default::default()
    };

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(opts.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e.file_name()));

    let mut actions = Vec::new();
    let mut seen_ids = HashSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(runtime) = Runtime::detect(entry.path(), is_executable(&entry)) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative.to_path_buf();

        let header = match read_header(entry.path()) {
            Ok(h) => h,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unreadable action");
                continue;
            },
        };

        let category = category_segments(&relative);
        let Some(id) = unique_id(&relative, &category, &mut seen_ids) else {
            continue;
        };

        actions.push(Action {
            id,
            meta: extract_metadata(&header.lines, entry.path()),
            file_path: std::path::absolute(entry.path())
                .unwrap_or_else(|_| entry.path().to_path_buf()),
            category,
            runtime,
            shebang: header.shebang,
            added_at: dates.get(&relative).copied(),
            origin: origin.clone(),
        });
    }

    actions.sort_by(|a, b| {
        a.meta
            .name
            .to_lowercase()
            .cmp(&b.meta.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    debug!(dir = %dir.display(), count = actions.len(), "loaded actions");
    actions
}

fn is_skipped(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('_') || name.starts_with('.')
}

fn category_segments(relative: &Path) -> Vec<String> {
    relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `<category>/<stem>`, or `<category>/<file name>` when two scripts share a
/// stem in the same directory.
fn unique_id(relative: &Path, category: &[String], seen: &mut HashSet<String>) -> Option<String> {
    let join = |base: &str| -> String {
        if category.is_empty() {
            base.to_string()
        } else {
            format!("{}/{base}", category.join("/"))
        }
    };
    let stem = relative.file_stem()?.to_string_lossy();
    let mut id = join(&stem);
    if seen.contains(&id) {
        id = join(&relative.file_name()?.to_string_lossy());
    }
    seen.insert(id.clone()).then_some(id)
}

#[cfg(unix)]
fn is_executable(entry: &DirEntry) -> bool {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_entry: &DirEntry) -> bool {
    false
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn loads_nested_actions_with_categories() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "hello.sh", "# kadai:name Hello\necho hi\n");
        write(tmp.path(), "db/reset.ts", "// kadai:emoji 🧹\nconsole.log(1)\n");
        write(tmp.path(), "db/seed/users.py", "print(1)\n");
        write(tmp.path(), "notes.md", "not an action");

        let actions = load_actions(tmp.path(), &Origin::Local);
        let ids: Vec<_> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["hello", "db/reset", "db/seed/users"]);

        let reset = &actions[1];
        assert_eq!(reset.meta.name, "Reset");
        assert_eq!(reset.meta.emoji.as_deref(), Some("🧹"));
        assert_eq!(reset.category, vec!["db"]);
        assert_eq!(reset.runtime, Runtime::Bun);
        assert!(reset.file_path.is_absolute());
        assert_eq!(actions[2].category, vec!["db", "seed"]);
        assert!(actions.iter().all(|a| a.origin == Origin::Local));
    }

    #[test]
    fn sorted_by_display_name() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.sh", "# kadai:name zeta\n");
        write(tmp.path(), "b.sh", "# kadai:name Alpha\n");
        let names: Vec<_> = load_actions(tmp.path(), &Origin::Local)
            .into_iter()
            .map(|a| a.meta.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }

    #[test]
    fn skips_hidden_and_underscore_entries() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "_lib/helper.sh", "echo\n");
        write(tmp.path(), ".git/hook.sh", "echo\n");
        write(tmp.path(), "_private.sh", "echo\n");
        write(tmp.path(), "visible.sh", "echo\n");

        let actions = load_actions(tmp.path(), &Origin::Local);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "visible");
    }

    #[test]
    fn depth_cap_excludes_deep_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a/b/c/ok.sh", "echo\n");
        write(tmp.path(), "a/b/c/d/too-deep.sh", "echo\n");
        write(tmp.path(), "a/b/c/d/e/f/g/h/deeper.sh", "echo\n");

        let actions = load_actions(tmp.path(), &Origin::Local);
        let ids: Vec<_> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a/b/c/ok"]);
    }

    #[test]
    fn colliding_stems_get_distinct_ids() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "build.sh", "echo\n");
        write(tmp.path(), "build.py", "print()\n");

        let actions = load_actions(tmp.path(), &Origin::Local);
        let mut ids: Vec<_> = actions.iter().map(|a| a.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["build", "build.sh"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let actions = load_actions(Path::new("/nonexistent/kadai/actions"), &Origin::Global);
        assert!(actions.is_empty());
    }

    #[test]
    fn records_shebang() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "tool.py", "#!/usr/bin/env -S uv run\nprint()\n");
        let actions = load_actions(tmp.path(), &Origin::Local);
        assert_eq!(actions[0].shebang.as_deref(), Some("/usr/bin/env -S uv run"));
    }

    #[cfg(unix)]
    #[test]
    fn executable_without_extension_is_an_action() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "deploy", "#!/bin/sh\necho\n");
        write(tmp.path(), "LICENSE", "MIT\n");
        let path = tmp.path().join("deploy");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let actions = load_actions(tmp.path(), &Origin::Local);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].runtime, Runtime::Executable);
    }
}
