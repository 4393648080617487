//! `added_at` enrichment from git history.
//!
//! One `git log` per scan, never per file. Outside a repository, or without
//! `git` on the host, the result is simply empty.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use {
    chrono::{DateTime, Utc},
    tracing::debug,
};

/// Map of path (relative to `dir`) to the time it was first committed.
pub fn added_dates(dir: &Path) -> HashMap<PathBuf, DateTime<Utc>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "core.quotePath=false",
            "log",
            "--diff-filter=A",
            "--name-only",
            "--relative",
            "--format=%x00%at",
            "--",
            ".",
        ])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => parse_log(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            debug!(dir = %dir.display(), status = %out.status, "git log unavailable, skipping dates");
            HashMap::new()
        },
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "git not runnable, skipping dates");
            HashMap::new()
        },
    }
}

/// Parse `--format=%x00%at --name-only` output. Commits arrive newest first,
/// so later entries overwrite earlier ones and the oldest add wins.
fn parse_log(stdout: &str) -> HashMap<PathBuf, DateTime<Utc>> {
    let mut dates = HashMap::new();
    let mut current: Option<DateTime<Utc>> = None;
    for line in stdout.lines() {
        if let Some(ts) = line.strip_prefix('\0') {
            current = ts
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(when) = current {
            dates.insert(PathBuf::from(line), when);
        }
    }
    dates
}
