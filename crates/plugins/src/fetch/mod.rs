//! Source fetchers: pull one plugin's content into a directory.

pub mod github;
pub mod npm;

use std::{path::Path, sync::Arc};

use {async_trait::async_trait, kadai_config::SyncConfig};

use crate::{error::Result, source::PluginSource};

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Concrete version or commit SHA, never a range or branch name.
    pub resolved_version: String,
}

/// Fetches one kind of plugin source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Populate `dest` with the plugin's content.
    async fn fetch(&self, source: &PluginSource, dest: &Path) -> Result<FetchOutcome>;

    /// Cheap staleness check against a previously resolved version.
    ///
    /// Failures report `false`: a check never blocks a sync pass.
    async fn check_for_update(&self, source: &PluginSource, current_version: &str) -> bool;
}

/// One fetcher per remote source kind.
#[derive(Clone)]
pub struct Fetchers {
    pub npm: Arc<dyn SourceFetcher>,
    pub github: Arc<dyn SourceFetcher>,
}

impl Fetchers {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            npm: Arc::new(npm::NpmFetcher::new(&config.registry_url)),
            github: Arc::new(github::GithubFetcher::new(&config.github_base_url)),
        }
    }

    /// The fetcher responsible for `source`; `None` for path sources.
    pub fn for_source(&self, source: &PluginSource) -> Option<&Arc<dyn SourceFetcher>> {
        match source {
            PluginSource::Npm { .. } => Some(&self.npm),
            PluginSource::Github { .. } => Some(&self.github),
            PluginSource::Path { .. } => None,
        }
    }
}

impl Default for Fetchers {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
