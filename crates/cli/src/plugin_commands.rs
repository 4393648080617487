//! `kadai sync` and `kadai plugins`.

use std::sync::{PoisonError, RwLock};

use {
    anyhow::bail,
    kadai_actions::Action,
    kadai_plugins::{
        LiveActions, PluginSource, PluginSyncStatus, SyncContext, SyncListener, cache,
        plugin_display_name, plugin_namespaces, sync_plugins,
    },
};

use crate::Project;

/// Prints per-plugin progress and forwards the refreshed set to the
/// aggregator.
struct ProgressListener<'a> {
    live: &'a RwLock<LiveActions>,
}

impl SyncListener for ProgressListener<'_> {
    fn on_plugin_status(&self, plugin: &str, status: &PluginSyncStatus) {
        match status {
            PluginSyncStatus::Syncing => eprintln!("  ⟳ {plugin}"),
            PluginSyncStatus::Done => eprintln!("  ✓ {plugin}"),
            PluginSyncStatus::Error { message } => eprintln!("  ✗ {plugin}: {message}"),
        }
    }

    fn on_update(&self, actions: Vec<Action>) {
        self.live.on_update(actions);
    }
}

pub async fn sync(project: &Project) -> anyhow::Result<()> {
    let sources = &project.config.plugins;
    if sources.is_empty() {
        println!("No plugins configured.");
        return Ok(());
    }

    let live = RwLock::new(LiveActions::load(&project.paths, &project.config));
    let ctx = SyncContext::from_config(&project.config);
    let report = sync_plugins(
        &project.paths.kadai_dir,
        sources,
        &ctx,
        &ProgressListener { live: &live },
    )
    .await;

    let total = live
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .actions()
        .len();
    println!(
        "Synced {} plugin(s), {} updated; {total} action(s) available.",
        report.results.len(),
        report.updated().count(),
    );

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} plugin(s) failed to sync");
    }
    Ok(())
}

pub fn list(project: &Project, json: bool) -> anyhow::Result<()> {
    let root = &project.paths.kadai_dir;
    let names: Vec<String> = project
        .config
        .plugins
        .iter()
        .zip(plugin_namespaces(root, &project.config.plugins))
        .map(|(source, name)| name.unwrap_or_else(|| plugin_display_name(source)))
        .collect();
    let rows: Vec<serde_json::Value> = project
        .config
        .plugins
        .iter()
        .zip(&names)
        .map(|(source, name)| {
            let meta = cache::slot_dir(root, source)
                .and_then(|slot| cache::read_plugin_meta(&slot));
            serde_json::json!({
                "name": name,
                "source": source.to_string(),
                "resolvedVersion": meta.as_ref().map(|m| m.resolved_version.clone()),
                "fetchedAt": meta.as_ref().map(|m| m.fetched_at.to_rfc3339()),
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No plugins configured.");
        return Ok(());
    }
    for ((source, row), name) in project.config.plugins.iter().zip(&rows).zip(&names) {
        let state = match (source, row["resolvedVersion"].as_str()) {
            (PluginSource::Path { .. }, _) => "live".to_string(),
            (_, Some(version)) => version.to_string(),
            (_, None) => "not synced".to_string(),
        };
        println!("  {name:<28} {state:<12} {source}");
    }
    Ok(())
}
