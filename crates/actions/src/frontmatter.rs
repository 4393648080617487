//! Metadata extraction from script headers.
//!
//! Frontmatter lives in ordinary comments near the top of a script:
//!
//! ```text
//! #!/usr/bin/env bash
//! # kadai:name Deploy to production
//! # kadai:emoji 🚀
//! # kadai:confirm
//! ```
//!
//! `//` comments work the same way for JavaScript and TypeScript. Unknown
//! keys are ignored.

use std::{
    io::{BufRead, BufReader, Read},
    path::Path,
};

use tracing::debug;

use crate::types::ActionMeta;

/// Lines scanned for frontmatter.
pub const FRONTMATTER_LINES: usize = 20;
/// Bytes of the first line considered for a shebang.
pub const SHEBANG_BYTES: usize = 256;
/// Upper bound on bytes read from any script header.
const HEADER_READ_LIMIT: u64 = 16 * 1024;

/// The leading part of a script file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptHeader {
    /// Interpreter line without the `#!` marker.
    pub shebang: Option<String>,
    pub lines: Vec<String>,
}

/// Read the shebang and the first [`FRONTMATTER_LINES`] lines of a script.
pub fn read_header(path: &Path) -> std::io::Result<ScriptHeader> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file.take(HEADER_READ_LIMIT));
    let mut lines = Vec::new();
    for line in reader.split(b'\n').take(FRONTMATTER_LINES) {
        let line = line?;
        lines.push(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string());
    }
    Ok(ScriptHeader {
        shebang: lines.first().and_then(|l| parse_shebang_line(l)),
        lines,
    })
}

fn parse_shebang_line(line: &str) -> Option<String> {
    let rest = line.strip_prefix("#!")?;
    let mut end = rest.len().min(SHEBANG_BYTES - 2);
    while !rest.is_char_boundary(end) {
        end -= 1;
    }
    let interp = rest[..end].trim();
    (!interp.is_empty()).then(|| interp.to_string())
}

/// Split a `# kadai:<key> <value>` or `// kadai:<key> <value>` line.
pub fn parse_frontmatter_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let rest = line
        .strip_prefix("//")
        .or_else(|| line.strip_prefix('#'))?
        .trim_start()
        .strip_prefix("kadai:")?;
    let (key, value) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let key = key.trim();
    (!key.is_empty()).then(|| (key, value.trim()))
}

/// Build metadata from header lines, falling back to a name derived from
/// `file_path` when no `kadai:name` is present.
pub fn extract_metadata(lines: &[String], file_path: &Path) -> ActionMeta {
    let mut meta = ActionMeta::default();
    for (key, value) in lines.iter().filter_map(|l| parse_frontmatter_line(l)) {
        match key {
            "name" if !value.is_empty() => meta.name = value.to_string(),
            "emoji" if !value.is_empty() => meta.emoji = Some(value.to_string()),
            "description" if !value.is_empty() => meta.description = Some(value.to_string()),
            "confirm" => set_flag(&mut meta.confirm, key, value, file_path),
            "hidden" => set_flag(&mut meta.hidden, key, value, file_path),
            "interactive" => set_flag(&mut meta.interactive, key, value, file_path),
            _ => {},
        }
    }
    if meta.name.is_empty() {
        meta.name = name_from_filename(file_path);
    }
    meta
}

fn set_flag(slot: &mut bool, key: &str, value: &str, file_path: &Path) {
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "yes" | "1" => *slot = true,
        "false" | "no" | "0" => *slot = false,
        other => {
            debug!(path = %file_path.display(), key, value = other, "ignoring unrecognized flag value");
        },
    }
}

/// `deploy-prod.sh` → `Deploy Prod`.
pub fn name_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
