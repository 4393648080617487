//! Concurrent plugin sync with per-plugin timeouts and failure isolation.

use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    chrono::Utc,
    futures::future::join_all,
    kadai_actions::{Action, LoadOptions, WhichCache},
    kadai_config::KadaiConfig,
    tracing::{debug, info, warn},
};

use crate::{
    cache::{self, PluginMeta},
    error::{Context, Error, Result},
    fetch::Fetchers,
    package_manager,
    source::{PluginSource, plugin_display_name, plugin_namespaces},
};

/// Progress of one plugin during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSyncStatus {
    Syncing,
    Done,
    Error { message: String },
}

/// Observer for a sync pass.
///
/// Status callbacks may arrive from concurrent tasks in any order across
/// plugins; `on_update` is called exactly once, after every task settled.
pub trait SyncListener: Send + Sync {
    fn on_plugin_status(&self, _plugin: &str, _status: &PluginSyncStatus) {}

    fn on_update(&self, _actions: Vec<Action>) {}
}

/// A listener that ignores every event.
pub struct NoopListener;

impl SyncListener for NoopListener {}

/// Everything a sync pass needs besides the sources.
#[derive(Clone)]
pub struct SyncContext {
    pub fetchers: Fetchers,
    /// Budget for one plugin, covering fetch and dependency install.
    pub timeout: Duration,
    /// Options for reloading cached actions afterwards.
    pub load: LoadOptions,
    /// `PATH` override for package-manager lookup; `None` uses the process `PATH`.
    pub search_path: Option<OsString>,
}

impl SyncContext {
    pub fn from_config(config: &KadaiConfig) -> Self {
        Self {
            fetchers: Fetchers::from_config(&config.sync),
            timeout: Duration::from_secs(config.sync.timeout_secs),
            load: LoadOptions {
                max_depth: config.actions.max_depth,
                added_at: false,
            },
            search_path: None,
        }
    }

    fn which(&self) -> WhichCache {
        match &self.search_path {
            Some(path) => WhichCache::with_search_path(path.clone()),
            None => WhichCache::new(),
        }
    }
}

/// Outcome of one plugin in a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSyncResult {
    pub name: String,
    pub source: PluginSource,
    pub status: PluginSyncStatus,
    /// The slot was (re)populated during this pass.
    pub updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub results: Vec<PluginSyncResult>,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = &PluginSyncResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, PluginSyncStatus::Error { .. }))
    }

    pub fn updated(&self) -> impl Iterator<Item = &PluginSyncResult> {
        self.results.iter().filter(|r| r.updated)
    }
}

/// Sync every remote source in `sources` into the cache under `root`.
///
/// Path sources are skipped here and only contribute to the final reload.
/// A failing or timed-out plugin leaves its previous slot in place and does
/// not affect the others.
pub async fn sync_plugins(
    root: &Path,
    sources: &[PluginSource],
    ctx: &SyncContext,
    listener: &dyn SyncListener,
) -> SyncReport {
    if let Err(e) = cache::ensure_cache_dir(root) {
        warn!(root = %root.display(), error = %e, "could not prepare plugin cache");
    }
    let which = ctx.which();

    let names = plugin_namespaces(root, sources);
    let mut seen = HashSet::new();
    let remote: Vec<(&PluginSource, String, String)> = sources
        .iter()
        .zip(names)
        .filter_map(|(s, name)| {
            let key = cache::cache_key_for(s)?;
            let name = name.unwrap_or_else(|| plugin_display_name(s));
            Some((s, key, name))
        })
        .filter(|(_, key, _)| seen.insert(key.clone()))
        .collect();

    let tasks = remote
        .into_iter()
        .map(|(source, key, name)| sync_one(root, source, key, name, ctx, &which, listener));
    let results = join_all(tasks).await;

    let actions = cache::load_cached_plugins_with(root, sources, &ctx.load);
    listener.on_update(actions);

    let report = SyncReport { results };
    info!(
        total = report.results.len(),
        updated = report.updated().count(),
        failed = report.failed().count(),
        "plugin sync finished"
    );
    report
}

async fn sync_one(
    root: &Path,
    source: &PluginSource,
    key: String,
    name: String,
    ctx: &SyncContext,
    which: &WhichCache,
    listener: &dyn SyncListener,
) -> PluginSyncResult {
    listener.on_plugin_status(&name, &PluginSyncStatus::Syncing);

    let slot = cache::plugins_cache_dir(root).join(&key);
    let staging = staging_dir(&slot);
    recover_slot(&slot).await;

    // Only staging runs under the timeout; the swap below must not be
    // interrupted between its two renames.
    let staged = match tokio::time::timeout(
        ctx.timeout,
        stage(source, &slot, &staging, ctx, which),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(ctx.timeout)),
    };
    let outcome = match staged {
        Ok(Some(version)) => swap_in(&staging, &slot).await.map(|()| {
            info!(%source, %version, "plugin slot updated");
            true
        }),
        Ok(None) => Ok(false),
        Err(e) => Err(e),
    };

    // Dropping a timed-out future can leave a half-written staging dir.
    if staging.exists()
        && let Err(e) = tokio::fs::remove_dir_all(&staging).await
    {
        debug!(path = %staging.display(), error = %e, "failed to remove staging directory");
    }

    let (status, updated) = match outcome {
        Ok(updated) => (PluginSyncStatus::Done, updated),
        Err(e) => {
            warn!(plugin = %name, error = %e, "plugin sync failed");
            (
                PluginSyncStatus::Error {
                    message: e.to_string(),
                },
                false,
            )
        },
    };
    listener.on_plugin_status(&name, &status);
    PluginSyncResult {
        name,
        source: source.clone(),
        status,
        updated,
    }
}

fn sibling(slot: &Path, suffix: &str) -> PathBuf {
    let mut name = slot
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    slot.with_file_name(name)
}

fn staging_dir(slot: &Path) -> PathBuf {
    sibling(slot, ".staging")
}

/// Where the previous slot waits while a new one is moved in.
fn backup_dir(slot: &Path) -> PathBuf {
    sibling(slot, ".old")
}

/// Finish a swap that was cut short: a lone backup becomes the slot again,
/// a backup next to a complete slot is discarded.
async fn recover_slot(slot: &Path) {
    let backup = backup_dir(slot);
    if !backup.exists() {
        return;
    }
    let result = if slot.exists() {
        tokio::fs::remove_dir_all(&backup).await
    } else {
        tokio::fs::rename(&backup, slot).await
    };
    match result {
        Ok(()) => debug!(slot = %slot.display(), "recovered interrupted plugin swap"),
        Err(e) => {
            warn!(slot = %slot.display(), error = %e, "could not recover interrupted plugin swap");
        },
    }
}

/// Fetch a fresh copy into `staging` when the slot is missing or stale.
///
/// Returns the resolved version of a ready staging dir, or `None` when the
/// slot is already current.
async fn stage(
    source: &PluginSource,
    slot: &Path,
    staging: &Path,
    ctx: &SyncContext,
    which: &WhichCache,
) -> Result<Option<String>> {
    let fetcher = ctx
        .fetchers
        .for_source(source)
        .ok_or_else(|| Error::message(format!("no fetcher for {source}")))?;

    if let Some(meta) = cache::read_plugin_meta(slot)
        && !fetcher
            .check_for_update(source, &meta.resolved_version)
            .await
    {
        debug!(%source, version = %meta.resolved_version, "plugin up to date");
        return Ok(None);
    }

    if staging.exists() {
        tokio::fs::remove_dir_all(staging).await?;
    }
    let outcome = fetcher.fetch(source, staging).await?;
    package_manager::install_dependencies(staging, which).await?;
    cache::write_plugin_meta(staging, &PluginMeta {
        fetched_at: Utc::now(),
        source: source.clone(),
        resolved_version: outcome.resolved_version.clone(),
    })?;
    Ok(Some(outcome.resolved_version))
}

/// Replace `slot` with `staging`. The previous slot is parked at
/// [`backup_dir`] and put back if the second rename fails.
async fn swap_in(staging: &Path, slot: &Path) -> Result<()> {
    let backup = backup_dir(slot);
    if backup.exists() {
        tokio::fs::remove_dir_all(&backup)
            .await
            .with_context(|| format!("failed to clear {}", backup.display()))?;
    }
    let had_slot = slot.exists();
    if had_slot {
        tokio::fs::rename(slot, &backup)
            .await
            .with_context(|| format!("failed to set aside {}", slot.display()))?;
    }
    if let Err(e) = tokio::fs::rename(staging, slot).await {
        if had_slot && let Err(restore) = tokio::fs::rename(&backup, slot).await {
            warn!(
                slot = %slot.display(),
                error = %restore,
                "failed to restore previous plugin slot"
            );
        }
        return Err(e)
            .with_context(|| format!("failed to move fetched plugin into {}", slot.display()));
    }
    if had_slot && let Err(e) = tokio::fs::remove_dir_all(&backup).await {
        debug!(path = %backup.display(), error = %e, "failed to remove previous plugin slot");
    }
    Ok(())
}
