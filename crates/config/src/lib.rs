//! Configuration loading and well-known paths.
//!
//! Config file: `.kadai/config.{toml,yaml,yml,json}` inside the project root.
//! A missing file yields defaults.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{KadaiPaths, discover_and_load, find_config_file, load_config},
    schema::{ActionsConfig, KadaiConfig, PluginSource, SyncConfig},
};
