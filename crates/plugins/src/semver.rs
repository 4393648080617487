//! The subset of npm semver used to resolve plugin versions.
//!
//! Supported constraints: exact versions, dist-tags, `^`, `~` and the
//! wildcards `*`/`x`. Prerelease and build tags are ignored when comparing,
//! and ranges never select a prerelease.

use std::collections::HashMap;

/// `major.minor.patch`; ordering is numeric per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// A parsed concrete version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVersion {
    pub version: Version,
    pub prerelease: bool,
}

/// Parse `1.2.3`, `1.2.3-beta.1`, `1.2.3+build` (leading `v`/`=` allowed).
pub fn parse_version(value: &str) -> Option<ParsedVersion> {
    let value = value.trim().trim_start_matches(['v', '=']);
    let without_build = value.split_once('+').map_or(value, |(v, _)| v);
    let (core, prerelease) = match without_build.split_once('-') {
        Some((core, pre)) => (core, !pre.is_empty()),
        None => (without_build, false),
    };
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ParsedVersion {
        version: Version::new(major, minor, patch),
        prerelease,
    })
}

/// A version requirement for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `*`, `x`, `X`.
    Any,
    /// A full version string, matched literally.
    Exact(String),
    /// `^1.2.3`: same major, or same minor when the major is zero.
    Caret(Version),
    /// `~1.2.3`: same minor. `~1` widens to the same major.
    Tilde { base: Version, minor_given: bool },
    /// A dist-tag such as `latest` or `next`.
    Tag(String),
}

impl Constraint {
    /// Interpret a constraint string; empty means the `latest` tag.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Tag("latest".into());
        }
        if matches!(raw, "*" | "x" | "X") {
            return Self::Any;
        }
        if let Some(rest) = raw.strip_prefix('^') {
            if let Some((base, _)) = parse_partial(rest) {
                return Self::Caret(base);
            }
        } else if let Some(rest) = raw.strip_prefix('~') {
            if let Some((base, minor_given)) = parse_partial(rest) {
                return Self::Tilde { base, minor_given };
            }
        } else if parse_version(raw).is_some() {
            return Self::Exact(raw.trim_start_matches(['v', '=']).to_string());
        }
        Self::Tag(raw.to_string())
    }

    /// Whether a non-prerelease `version` satisfies this range.
    pub fn matches(&self, version: Version) -> bool {
        match self {
            Self::Any => true,
            Self::Caret(base) => {
                version >= *base
                    && if base.major > 0 {
                        version.major == base.major
                    } else {
                        version.major == 0 && version.minor == base.minor
                    }
            },
            Self::Tilde { base, minor_given } => {
                version >= *base
                    && version.major == base.major
                    && (!minor_given || version.minor == base.minor)
            },
            Self::Exact(_) | Self::Tag(_) => false,
        }
    }
}

/// `1`, `1.2`, `1.2.3`, `1.x`; missing or wildcard components are zero.
/// Returns the base and whether a minor component was given.
fn parse_partial(value: &str) -> Option<(Version, bool)> {
    let value = value.trim();
    if let Some(parsed) = parse_version(value) {
        return Some((parsed.version, true));
    }
    let mut parts = value.split('.');
    let component = |p: Option<&str>| -> Option<Option<u64>> {
        match p {
            None | Some("x" | "X" | "*") => Some(None),
            Some(n) => n.parse().ok().map(Some),
        }
    };
    let major = component(parts.next())??;
    let minor = component(parts.next())?;
    let patch = component(parts.next())?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }
    Some((
        Version::new(major, minor.unwrap_or(0), patch),
        minor.is_some(),
    ))
}

/// Pick the concrete version satisfying `constraint` among `versions`.
///
/// Ranges choose the highest `(major, minor, patch)` and skip prereleases.
/// Exact versions and dist-tags may name a prerelease explicitly.
pub fn resolve<'a>(
    constraint: &str,
    versions: impl IntoIterator<Item = &'a str>,
    dist_tags: &HashMap<String, String>,
) -> Option<String> {
    let versions: Vec<&str> = versions.into_iter().collect();
    match Constraint::parse(constraint) {
        Constraint::Tag(tag) => dist_tags
            .get(&tag)
            .filter(|v| versions.contains(&v.as_str()))
            .cloned(),
        Constraint::Exact(exact) => versions
            .iter()
            .find(|v| **v == exact)
            .map(|v| v.to_string()),
        range => versions
            .iter()
            .filter_map(|raw| parse_version(raw).map(|p| (*raw, p)))
            .filter(|(_, p)| !p.prerelease && range.matches(p.version))
            .max_by_key(|(_, p)| p.version)
            .map(|(raw, _)| raw.to_string()),
    }
}
