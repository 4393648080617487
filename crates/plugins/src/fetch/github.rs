//! GitHub fetcher: shallow clone, pin to the checked-out commit.

use std::path::Path;

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fetch::{FetchOutcome, SourceFetcher},
    source::PluginSource,
};

/// Fetches plugins from git repositories hosted under `base_url`.
pub struct GithubFetcher {
    base_url: String,
}

impl GithubFetcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn clone_url(&self, repo: &str) -> String {
        format!("{}/{}.git", self.base_url, repo.trim_end_matches(".git"))
    }

    /// Latest commit of `git_ref` (or `HEAD`) on the remote.
    pub async fn remote_sha(&self, repo: &str, git_ref: Option<&str>) -> Result<String> {
        let url = self.clone_url(repo);
        let target = git_ref.unwrap_or("HEAD");
        let stdout = run_git(None, &["ls-remote", &url, target], "ls-remote", &url).await?;
        parse_ls_remote(&stdout, target).ok_or_else(|| Error::Git {
            operation: "ls-remote",
            url,
            stderr: format!("ref '{target}' not found"),
        })
    }
}

fn github_parts(source: &PluginSource) -> Result<(&str, Option<&str>)> {
    match source {
        PluginSource::Github { repo, git_ref } => Ok((repo, git_ref.as_deref())),
        other => Err(Error::message(format!("github fetcher cannot handle {other}"))),
    }
}

async fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
    operation: &'static str,
    url: &str,
) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!(?args, "running git");
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::Git {
            operation,
            url: url.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pick the SHA for `target` out of `git ls-remote` output.
///
/// Branches win over tags; an annotated tag's peeled (`^{}`) line wins over
/// the tag object itself. Without a qualified match the first line is used.
pub fn parse_ls_remote(stdout: &str, target: &str) -> Option<String> {
    let refs: Vec<(&str, &str)> = stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?, parts.next()?))
        })
        .collect();

    let find = |name: String| {
        refs.iter()
            .find(|(_, r)| *r == name)
            .map(|(sha, _)| sha.to_string())
    };

    find(format!("refs/heads/{target}"))
        .or_else(|| find(format!("refs/tags/{target}^{{}}")))
        .or_else(|| find(format!("refs/tags/{target}")))
        .or_else(|| refs.first().map(|(sha, _)| sha.to_string()))
}

#[async_trait]
impl SourceFetcher for GithubFetcher {
    async fn fetch(&self, source: &PluginSource, dest: &Path) -> Result<FetchOutcome> {
        let (repo, git_ref) = github_parts(source)?;
        let url = self.clone_url(repo);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let dest_str = dest.to_string_lossy();

        let mut args = vec!["clone", "--depth", "1", "--single-branch"];
        if let Some(r) = git_ref {
            args.extend(["--branch", r]);
        }
        args.extend([url.as_str(), dest_str.as_ref()]);
        run_git(None, &args, "clone", &url).await?;

        let sha = run_git(Some(dest), &["rev-parse", "HEAD"], "rev-parse", &url)
            .await?
            .trim()
            .to_string();

        let git_dir = dest.join(".git");
        if git_dir.exists() {
            tokio::fs::remove_dir_all(&git_dir).await?;
        }

        info!(%repo, %sha, "fetched github plugin");
        Ok(FetchOutcome {
            resolved_version: sha,
        })
    }

    async fn check_for_update(&self, source: &PluginSource, current_version: &str) -> bool {
        let Ok((repo, git_ref)) = github_parts(source) else {
            return false;
        };
        match self.remote_sha(repo, git_ref).await {
            Ok(sha) => sha != current_version,
            Err(e) => {
                warn!(%repo, error = %e, "github update check failed, assuming up to date");
                false
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const LS_REMOTE: &str = "\
1111111111111111111111111111111111111111\tHEAD
2222222222222222222222222222222222222222\trefs/heads/main
3333333333333333333333333333333333333333\trefs/tags/v1.0.0
4444444444444444444444444444444444444444\trefs/tags/v1.0.0^{}
";

    #[test]
    fn clone_url_joins_base_and_repo() {
        let fetcher = GithubFetcher::new("https://github.com/");
        assert_eq!(
            fetcher.clone_url("acme/tasks"),
            "https://github.com/acme/tasks.git"
        );
        assert_eq!(
            fetcher.clone_url("acme/tasks.git"),
            "https://github.com/acme/tasks.git"
        );
    }

    #[test]
    fn ls_remote_prefers_branch() {
        assert_eq!(
            parse_ls_remote(LS_REMOTE, "main").as_deref(),
            Some("2222222222222222222222222222222222222222")
        );
    }

    #[test]
    fn ls_remote_prefers_peeled_tag() {
        assert_eq!(
            parse_ls_remote(LS_REMOTE, "v1.0.0").as_deref(),
            Some("4444444444444444444444444444444444444444")
        );
    }

    #[test]
    fn ls_remote_head_falls_back_to_first_line() {
        assert_eq!(
            parse_ls_remote(LS_REMOTE, "HEAD").as_deref(),
            Some("1111111111111111111111111111111111111111")
        );
        assert_eq!(parse_ls_remote("", "HEAD"), None);
    }

    #[tokio::test]
    async fn update_check_on_unreachable_remote_is_false() {
        let tmp = tempfile::tempdir().unwrap();
        let base = format!("file://{}", tmp.path().display());
        let fetcher = GithubFetcher::new(&base);
        let source = PluginSource::Github {
            repo: "acme/missing".into(),
            git_ref: None,
        };
        assert!(!fetcher.check_for_update(&source, "abc").await);
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(["-c", "user.name=kadai", "-c", "user.email=kadai@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// A local repository served as `<base>/acme/tasks.git`.
    fn local_remote(base: &Path) -> String {
        let repo = base.join("acme/tasks.git");
        std::fs::create_dir_all(repo.join("actions")).unwrap();
        std::fs::write(repo.join("actions/hello.sh"), "echo hello\n").unwrap();
        git(&repo, &["init", "--quiet", "--initial-branch=main"]);
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "--quiet", "-m", "initial"]);
        git(&repo, &["rev-parse", "HEAD"])
    }

    #[tokio::test]
    async fn fetch_clones_pins_sha_and_drops_git_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let remotes = tmp.path().join("remotes");
        let head = local_remote(&remotes);
        let fetcher = GithubFetcher::new(&format!("file://{}", remotes.display()));

        for git_ref in [None, Some("main".to_string())] {
            let source = PluginSource::Github {
                repo: "acme/tasks".into(),
                git_ref: git_ref.clone(),
            };
            let dest = tmp
                .path()
                .join("slots")
                .join(git_ref.as_deref().unwrap_or("HEAD"));

            let outcome = fetcher.fetch(&source, &dest).await.unwrap();
            assert_eq!(outcome.resolved_version, head);
            assert_eq!(head.len(), 40);
            assert!(dest.join("actions/hello.sh").is_file());
            assert!(!dest.join(".git").exists());

            assert!(!fetcher.check_for_update(&source, &head).await);
            assert!(fetcher.check_for_update(&source, &"0".repeat(40)).await);
        }
    }
}
