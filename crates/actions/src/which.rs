//! Memoized PATH lookups for interpreter binaries.

use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::trace;

/// Resolves binary names on a search path, once per name.
///
/// Built once per invocation and shared by reference; a fresh cache sees
/// binaries installed since the previous one was built.
#[derive(Debug, Default)]
pub struct WhichCache {
    /// `None` means the process `PATH`.
    search_path: Option<OsString>,
    entries: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl WhichCache {
    /// Cache over the process `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache over an explicit `PATH`-style list of directories.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            entries: Mutex::default(),
        }
    }

    /// Full path of `name`, if found.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = entries.get(name) {
            return hit.clone();
        }
        let found = match &self.search_path {
            Some(paths) => which::which_in(name, Some(paths), Path::new(".")).ok(),
            None => which::which(name).ok(),
        };
        trace!(binary = name, found = ?found, "PATH lookup");
        entries.insert(name.to_string(), found.clone());
        found
    }

    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}
