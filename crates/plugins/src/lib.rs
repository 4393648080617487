//! Plugin sources, the on-disk plugin cache and the sync orchestrator.
//!
//! Plugins are npm packages, GitHub repositories or local directories that
//! ship an `actions/` tree. Remote plugins are fetched into versioned cache
//! slots under `.kadai/.cache/plugins`, and their actions are namespaced by
//! plugin name before being merged with project actions.

pub mod aggregate;
pub mod archive;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod package_manager;
pub mod semver;
pub mod source;
pub mod sync;

pub use {
    aggregate::LiveActions,
    cache::{
        PluginMeta, cache_key_for, ensure_cache_dir, load_cached_plugins,
        load_cached_plugins_with, plugins_cache_dir, read_plugin_meta, write_plugin_meta,
    },
    error::{Error, Result},
    fetch::{FetchOutcome, Fetchers, SourceFetcher},
    source::{PluginSource, plugin_display_name, plugin_namespaces},
    sync::{
        NoopListener, PluginSyncResult, PluginSyncStatus, SyncContext, SyncListener, SyncReport,
        sync_plugins,
    },
};
