//! Installs a plugin's own dependencies with the package manager it declares.

use std::{fmt, path::Path};

use {
    kadai_actions::WhichCache,
    tokio::process::Command,
    tracing::{debug, info},
};

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Bun,
    Pnpm,
    Yarn,
    Npm,
}

impl PackageManager {
    pub fn binary(self) -> &'static str {
        match self {
            Self::Bun => "bun",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Npm => "npm",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "bun" => Some(Self::Bun),
            "pnpm" => Some(Self::Pnpm),
            "yarn" => Some(Self::Yarn),
            "npm" => Some(Self::Npm),
            _ => None,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

const LOCKFILES: &[(&str, PackageManager)] = &[
    ("bun.lock", PackageManager::Bun),
    ("bun.lockb", PackageManager::Bun),
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("yarn.lock", PackageManager::Yarn),
    ("package-lock.json", PackageManager::Npm),
];

pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

fn read_manifest(dir: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(dir.join(MANIFEST_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Whether `package.json` lists anything under `dependencies` or
/// `optionalDependencies`. Dev dependencies are never installed for plugins.
pub fn declares_dependencies(dir: &Path) -> bool {
    let Some(manifest) = read_manifest(dir) else {
        return false;
    };
    ["dependencies", "optionalDependencies"].iter().any(|field| {
        manifest
            .get(field)
            .and_then(|v| v.as_object())
            .is_some_and(|deps| !deps.is_empty())
    })
}

/// The `packageManager` field of `package.json`, e.g. `pnpm@9.1.0` → pnpm.
fn declared_manager(dir: &Path) -> Option<PackageManager> {
    let manifest = read_manifest(dir)?;
    let field = manifest.get("packageManager")?.as_str()?;
    let name = field.split('@').next().unwrap_or(field);
    PackageManager::from_name(name.trim())
}

fn lockfile_manager(dir: &Path) -> Option<PackageManager> {
    LOCKFILES
        .iter()
        .find(|(file, _)| dir.join(file).is_file())
        .map(|(_, pm)| *pm)
}

/// Choose the install tool for `dir`: the `packageManager` field, then a
/// lockfile, then whichever of bun or npm is on `PATH`. A declared choice
/// whose binary is missing falls through to the next rule.
pub fn resolve_package_manager(dir: &Path, which: &WhichCache) -> Option<PackageManager> {
    [declared_manager(dir), lockfile_manager(dir)]
        .into_iter()
        .flatten()
        .chain([PackageManager::Bun, PackageManager::Npm])
        .find(|pm| which.has(pm.binary()))
}

/// Run `<pm> install` in `dir` when its manifest declares dependencies.
///
/// Returns the manager used, or `None` when there is nothing to install.
pub async fn install_dependencies(dir: &Path, which: &WhichCache) -> Result<Option<PackageManager>> {
    if !has_manifest(dir) {
        debug!(dir = %dir.display(), "no package.json, skipping install");
        return Ok(None);
    }
    if !declares_dependencies(dir) {
        debug!(dir = %dir.display(), "package.json declares no dependencies, skipping install");
        return Ok(None);
    }
    let pm = resolve_package_manager(dir, which).ok_or_else(|| {
        Error::message(format!(
            "no package manager found to install dependencies in {}",
            dir.display()
        ))
    })?;
    let binary = which
        .lookup(pm.binary())
        .ok_or_else(|| Error::message(format!("{pm} disappeared from PATH")))?;

    info!(dir = %dir.display(), manager = %pm, "installing plugin dependencies");
    let output = Command::new(&binary)
        .arg("install")
        .current_dir(dir)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::InstallFailed {
            manager: pm.binary(),
            dir: dir.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(Some(pm))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use {super::*, std::os::unix::fs::PermissionsExt};

    fn script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn package_manager_field_wins() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        for b in ["bun", "pnpm", "npm"] {
            script(bins.path(), b, "exit 0");
        }
        manifest(plugin.path(), r#"{"packageManager":"pnpm@9.1.0"}"#);
        std::fs::write(plugin.path().join("yarn.lock"), "").unwrap();

        let which = WhichCache::with_search_path(bins.path());
        assert_eq!(
            resolve_package_manager(plugin.path(), &which),
            Some(PackageManager::Pnpm)
        );
    }

    #[test]
    fn lockfile_then_path_fallback() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        script(bins.path(), "yarn", "exit 0");
        script(bins.path(), "npm", "exit 0");
        manifest(plugin.path(), "{}");
        let which = WhichCache::with_search_path(bins.path());

        assert_eq!(
            resolve_package_manager(plugin.path(), &which),
            Some(PackageManager::Npm)
        );
        std::fs::write(plugin.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            resolve_package_manager(plugin.path(), &which),
            Some(PackageManager::Yarn)
        );
    }

    #[test]
    fn declared_but_missing_falls_through() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        script(bins.path(), "bun", "exit 0");
        manifest(plugin.path(), r#"{"packageManager":"yarn@4"}"#);
        let which = WhichCache::with_search_path(bins.path());
        assert_eq!(
            resolve_package_manager(plugin.path(), &which),
            Some(PackageManager::Bun)
        );
    }

    #[tokio::test]
    async fn no_manifest_is_a_noop() {
        let plugin = tempfile::tempdir().unwrap();
        let which = WhichCache::with_search_path(plugin.path());
        assert_eq!(install_dependencies(plugin.path(), &which).await.unwrap(), None);
    }

    #[tokio::test]
    async fn runs_install_in_plugin_dir() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        script(bins.path(), "npm", "touch installed-$1");
        manifest(plugin.path(), r#"{"dependencies":{"left-pad":"1.0.0"}}"#);
        let which = WhichCache::with_search_path(bins.path());

        let used = install_dependencies(plugin.path(), &which).await.unwrap();
        assert_eq!(used, Some(PackageManager::Npm));
        assert!(plugin.path().join("installed-install").exists());
    }

    #[tokio::test]
    async fn failed_install_carries_stderr() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        script(bins.path(), "bun", "echo 'lockfile is corrupt' >&2\nexit 1");
        manifest(plugin.path(), r#"{"dependencies":{"left-pad":"1.0.0"}}"#);
        let which = WhichCache::with_search_path(bins.path());

        let err = install_dependencies(plugin.path(), &which).await.unwrap_err();
        match err {
            Error::InstallFailed { manager, stderr, .. } => {
                assert_eq!(manager, "bun");
                assert_eq!(stderr, "lockfile is corrupt");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_tools_is_an_error() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        manifest(plugin.path(), r#"{"dependencies":{"left-pad":"1.0.0"}}"#);
        let which = WhichCache::with_search_path(bins.path());
        assert!(install_dependencies(plugin.path(), &which).await.is_err());
    }

    #[tokio::test]
    async fn manifest_without_dependencies_skips_install() {
        let bins = tempfile::tempdir().unwrap();
        let plugin = tempfile::tempdir().unwrap();
        manifest(
            plugin.path(),
            r#"{"name":"tasks","dependencies":{},"devDependencies":{"vitest":"1"}}"#,
        );
        let which = WhichCache::with_search_path(bins.path());
        assert_eq!(install_dependencies(plugin.path(), &which).await.unwrap(), None);
    }

    #[test]
    fn optional_dependencies_count() {
        let plugin = tempfile::tempdir().unwrap();
        manifest(plugin.path(), r#"{"optionalDependencies":{"fsevents":"2"}}"#);
        assert!(declares_dependencies(plugin.path()));
        manifest(plugin.path(), "not json");
        assert!(!declares_dependencies(plugin.path()));
    }
}
