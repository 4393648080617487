//! Process argv resolution for actions.
//!
//! Three tiers, each falling through when it has nothing to offer:
//!
//! 1. the script's own shebang,
//! 2. the runtime chain: the first interpreter found on `PATH`,
//! 3. a fixed interpreter per runtime.

use tracing::debug;

use crate::{
    types::{Action, Runtime},
    which::WhichCache,
};

/// Candidate interpreters in priority order. Each candidate is a program
/// plus leading arguments.
pub fn runtime_chain(runtime: Runtime) -> &'static [&'static [&'static str]] {
    match runtime {
        Runtime::Bun => &[&["bun"]],
        Runtime::Node => &[&["node"], &["bun"]],
        Runtime::Bash => &[&["bash"], &["sh"]],
        Runtime::Zsh => &[&["zsh"]],
        Runtime::Python => &[&["uv", "run"], &["python3"], &["python"]],
        Runtime::Executable => &[],
    }
}

/// Interpreter used when neither the shebang nor the chain resolves.
pub fn fallback_interpreter(runtime: Runtime) -> Option<&'static str> {
    match runtime {
        Runtime::Bun => Some("bun"),
        Runtime::Node => Some("node"),
        Runtime::Bash => Some("bash"),
        Runtime::Zsh => Some("zsh"),
        Runtime::Python => Some("python3"),
        Runtime::Executable => None,
    }
}

/// Parse an interpreter line (without `#!`) into argv, script excluded.
///
/// Supports `/usr/bin/env [options] [NAME=value...] interp [args]` and
/// absolute interpreter paths with inline arguments.
pub fn parse_shebang(line: &str) -> Option<Vec<String>> {
    let mut tokens = line.split_whitespace();
    let program = tokens.next()?;
    let rest: Vec<&str> = tokens.collect();

    if program == "env" || program.ends_with("/env") {
        let mut tokens = rest.into_iter();
        while let Some(token) = tokens.next() {
            if matches!(token, "-u" | "-C" | "--unset" | "--chdir") {
                tokens.next();
            } else if let Some(inline) = token.strip_prefix("-S").filter(|s| !s.is_empty()) {
                // `-Sinterp args` written without a space.
                return Some(
                    std::iter::once(inline)
                        .chain(tokens)
                        .map(str::to_string)
                        .collect(),
                );
            } else if token.starts_with('-') || token.contains('=') {
                // Other env options and `NAME=value` assignments.
            } else {
                return Some(
                    std::iter::once(token)
                        .chain(tokens)
                        .map(str::to_string)
                        .collect(),
                );
            }
        }
        return None;
    }

    if program.starts_with('/') {
        return Some(
            std::iter::once(program)
                .chain(rest)
                .map(str::to_string)
                .collect(),
        );
    }
    None
}

/// Choose the exact argv used to run `action`. The script path is always
/// the last element.
pub fn resolve_command(action: &Action, which: &WhichCache) -> Vec<String> {
    let script = action.file_path.to_string_lossy().into_owned();

    if let Some(mut argv) = action.shebang.as_deref().and_then(parse_shebang) {
        debug!(action = %action.id, interpreter = %argv[0], "resolved via shebang");
        argv.push(script);
        return argv;
    }

    for candidate in runtime_chain(action.runtime) {
        if which.has(candidate[0]) {
            debug!(action = %action.id, interpreter = candidate[0], "resolved via runtime chain");
            let mut argv: Vec<String> = candidate.iter().map(|s| s.to_string()).collect();
            argv.push(script);
            return argv;
        }
    }

    match fallback_interpreter(action.runtime) {
        Some(interp) => {
            debug!(action = %action.id, interpreter = interp, "resolved via fallback");
            vec![interp.to_string(), script]
        },
        None => vec![script],
    }
}
