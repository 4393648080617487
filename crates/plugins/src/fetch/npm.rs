//! npm registry fetcher.

use std::{collections::HashMap, path::Path};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use crate::{
    archive,
    error::{Error, Result},
    fetch::{FetchOutcome, SourceFetcher},
    semver,
    source::PluginSource,
};

const USER_AGENT: &str = concat!("kadai/", env!("CARGO_PKG_VERSION"));

/// Registry metadata for one package (the "packument"), trimmed to the
/// fields resolution needs.
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default, rename = "dist-tags")]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, PackageVersion>,
}

#[derive(Debug, Deserialize)]
struct PackageVersion {
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: String,
}

/// A version picked from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub version: String,
    pub tarball: String,
}

/// Fetches plugins published to an npm-compatible registry.
pub struct NpmFetcher {
    client: reqwest::Client,
    registry_url: String,
}

impl NpmFetcher {
    pub fn new(registry_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url: registry_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<registry>/<package>`, with the scope separator encoded.
    pub fn package_url(&self, package: &str) -> String {
        format!("{}/{}", self.registry_url, package.replace('/', "%2f"))
    }

    async fn packument(&self, package: &str) -> Result<Packument> {
        let url = self.package_url(package);
        debug!(%package, %url, "fetching registry metadata");
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound {
                package: package.to_string(),
            });
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    /// Resolve `constraint` (default: the `latest` tag) to a concrete version.
    pub async fn resolve(
        &self,
        package: &str,
        constraint: Option<&str>,
    ) -> Result<ResolvedPackage> {
        let constraint = constraint.unwrap_or("latest");
        let packument = self.packument(package).await?;
        let version = semver::resolve(
            constraint,
            packument.versions.keys().map(String::as_str),
            &packument.dist_tags,
        )
        .ok_or_else(|| Error::VersionNotFound {
            package: package.to_string(),
            constraint: constraint.to_string(),
        })?;
        let tarball = packument
            .versions
            .get(&version)
            .map(|v| v.dist.tarball.clone())
            .ok_or_else(|| Error::VersionNotFound {
                package: package.to_string(),
                constraint: constraint.to_string(),
            })?;
        Ok(ResolvedPackage { version, tarball })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

fn npm_parts(source: &PluginSource) -> Result<(&str, Option<&str>)> {
    match source {
        PluginSource::Npm { package, version } => Ok((package, version.as_deref())),
        other => Err(Error::message(format!("npm fetcher cannot handle {other}"))),
    }
}

#[async_trait]
impl SourceFetcher for NpmFetcher {
    async fn fetch(&self, source: &PluginSource, dest: &Path) -> Result<FetchOutcome> {
        let (package, constraint) = npm_parts(source)?;
        let resolved = self.resolve(package, constraint).await?;
        let bytes = self.download(&resolved.tarball).await?;
        archive::unpack_tarball(bytes, dest).await?;
        info!(%package, version = %resolved.version, "fetched npm plugin");
        Ok(FetchOutcome {
            resolved_version: resolved.version,
        })
    }

    async fn check_for_update(&self, source: &PluginSource, current_version: &str) -> bool {
        let Ok((package, constraint)) = npm_parts(source) else {
            return false;
        };
        match self.resolve(package, constraint).await {
            Ok(resolved) => {
                let stale = resolved.version != current_version;
                debug!(
                    %package,
                    current = current_version,
                    latest = %resolved.version,
                    stale,
                    "npm update check"
                );
                stale
            },
            Err(e) => {
                warn!(%package, error = %e, "npm update check failed, assuming up to date");
                false
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::archive::build_tarball};

    fn npm(package: &str, version: Option<&str>) -> PluginSource {
        PluginSource::Npm {
            package: package.into(),
            version: version.map(str::to_string),
        }
    }

    fn packument_body(server_url: &str, versions: &[&str], latest: &str) -> String {
        let versions: serde_json::Map<String, serde_json::Value> = versions
            .iter()
            .map(|v| {
                (
                    v.to_string(),
                    serde_json::json!({
                        "dist": { "tarball": format!("{server_url}/tasks/-/tasks-{v}.tgz") }
                    }),
                )
            })
            .collect();
        serde_json::json!({ "dist-tags": { "latest": latest }, "versions": versions }).to_string()
    }

    #[test]
    fn scoped_package_url_is_encoded() {
        let fetcher = NpmFetcher::new("https://registry.npmjs.org/");
        assert_eq!(
            fetcher.package_url("@acme/tasks"),
            "https://registry.npmjs.org/@acme%2ftasks"
        );
    }

    #[tokio::test]
    async fn resolves_caret_against_registry() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body(packument_body(
                &server.url(),
                &["1.0.0", "1.2.0", "2.0.0"],
                "2.0.0",
            ))
            .create_async()
            .await;

        let fetcher = NpmFetcher::new(&server.url());
        let resolved = fetcher.resolve("tasks", Some("^1.0.0")).await.unwrap();
        assert_eq!(resolved.version, "1.2.0");
        assert!(resolved.tarball.ends_with("/tasks/-/tasks-1.2.0.tgz"));

        let latest = fetcher.resolve("tasks", None).await.unwrap();
        assert_eq!(latest.version, "2.0.0");
    }

    #[tokio::test]
    async fn missing_package_is_a_resolution_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ghost")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = NpmFetcher::new(&server.url());
        let err = fetcher.resolve("ghost", None).await.unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
        assert!(!fetcher.check_for_update(&npm("ghost", None), "1.0.0").await);
    }

    #[tokio::test]
    async fn unmatched_range_is_a_resolution_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body(packument_body(&server.url(), &["1.0.0"], "1.0.0"))
            .create_async()
            .await;

        let fetcher = NpmFetcher::new(&server.url());
        let err = fetcher.resolve("tasks", Some("^3.0.0")).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_unpacks_tarball_and_pins_version() {
        let mut server = mockito::Server::new_async().await;
        let _meta = server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body(packument_body(&server.url(), &["1.0.0", "1.4.2"], "1.4.2"))
            .create_async()
            .await;
        let _tgz = server
            .mock("GET", "/tasks/-/tasks-1.4.2.tgz")
            .with_status(200)
            .with_body(build_tarball(&[(
                "package/actions/hello.sh",
                "# kadai:name Hello\necho hi\n",
            )]))
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("slot");
        let fetcher = NpmFetcher::new(&server.url());
        let outcome = fetcher
            .fetch(&npm("tasks", Some("^1.0.0")), &dest)
            .await
            .unwrap();
        assert_eq!(outcome.resolved_version, "1.4.2");
        assert!(dest.join("actions/hello.sh").is_file());
    }

    #[tokio::test]
    async fn update_check_compares_resolved_versions() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body(packument_body(&server.url(), &["1.0.0", "1.1.0"], "1.1.0"))
            .expect_at_least(1)
            .create_async()
            .await;

        let fetcher = NpmFetcher::new(&server.url());
        let source = npm("tasks", Some("^1.0.0"));
        assert!(fetcher.check_for_update(&source, "1.0.0").await);
        assert!(!fetcher.check_for_update(&source, "1.1.0").await);
    }

    #[tokio::test]
    async fn update_check_swallows_network_errors() {
        // Nothing listens on this port.
        let fetcher = NpmFetcher::new("http://127.0.0.1:9");
        assert!(!fetcher.check_for_update(&npm("tasks", None), "1.0.0").await);
    }

    #[tokio::test]
    async fn rejects_foreign_source_kinds() {
        let fetcher = NpmFetcher::new("http://127.0.0.1:9");
        let source = PluginSource::Path {
            path: "/tmp/x".into(),
        };
        let tmp = tempfile::tempdir().unwrap();
        assert!(fetcher.fetch(&source, tmp.path()).await.is_err());
    }
}
