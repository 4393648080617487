//! The merged, refreshable view of every action kadai can run.

use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use {
    kadai_actions::{Action, LoadOptions, Origin, load_actions_with},
    kadai_config::{KadaiConfig, KadaiPaths},
    tracing::debug,
};

use crate::{cache, sync::SyncListener};

/// Local, global and plugin actions kept in separate buckets so a plugin
/// refresh never drops the others.
#[derive(Debug, Clone, Default)]
pub struct LiveActions {
    local: Vec<Action>,
    global: Vec<Action>,
    plugins: Vec<Action>,
}

impl LiveActions {
    pub fn new(local: Vec<Action>, global: Vec<Action>, plugins: Vec<Action>) -> Self {
        Self {
            local,
            global,
            plugins,
        }
    }

    /// Scan project and global actions and read the plugin cache as it is now.
    pub fn load(paths: &KadaiPaths, config: &KadaiConfig) -> Self {
        let opts = LoadOptions {
            max_depth: config.actions.max_depth,
            added_at: config.actions.added_at,
        };
        let local = load_actions_with(&paths.actions_dir(), &Origin::Local, &opts);
        let global = paths
            .global_actions_dir()
            .filter(|dir| *dir != paths.actions_dir())
            .map(|dir| load_actions_with(&dir, &Origin::Global, &opts))
            .unwrap_or_default();
        let plugin_opts = LoadOptions {
            added_at: false,
            ..opts
        };
        let plugins =
            cache::load_cached_plugins_with(&paths.kadai_dir, &config.plugins, &plugin_opts);
        debug!(
            local = local.len(),
            global = global.len(),
            plugins = plugins.len(),
            "loaded actions"
        );
        Self::new(local, global, plugins)
    }

    /// Replace the plugin bucket; local and global actions are kept.
    pub fn set_plugin_actions(&mut self, actions: Vec<Action>) {
        self.plugins = actions;
    }

    /// Local, then global, then plugin actions; later duplicates by id are
    /// dropped.
    pub fn actions(&self) -> Vec<Action> {
        let mut seen = HashSet::new();
        self.local
            .iter()
            .chain(&self.global)
            .chain(&self.plugins)
            .filter(|a| seen.insert(a.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Action> {
        self.local
            .iter()
            .chain(&self.global)
            .chain(&self.plugins)
            .find(|a| a.id == id)
    }
}

impl SyncListener for RwLock<LiveActions> {
    fn on_update(&self, actions: Vec<Action>) {
        self.write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_plugin_actions(actions);
    }
}
