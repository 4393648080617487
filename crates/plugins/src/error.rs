use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {kadai_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("npm package '{package}' not found in registry")]
    PackageNotFound { package: String },

    #[error("no version of '{package}' matches '{constraint}'")]
    VersionNotFound { package: String, constraint: String },

    #[error("git {operation} failed for {url}: {stderr}")]
    Git {
        operation: &'static str,
        url: String,
        stderr: String,
    },

    #[error("{manager} install failed in {dir}: {stderr}")]
    InstallFailed {
        manager: &'static str,
        dir: PathBuf,
        stderr: String,
    },

    #[error("archive contains unsafe entry: {path}")]
    UnsafeArchive { path: PathBuf },

    #[error("sync timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsafe_archive(path: &Path) -> Self {
        Self::UnsafeArchive {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

kadai_common::impl_context!();
