//! Action discovery and command resolution.
//!
//! Actions are scripts found under an actions directory. Each file with a
//! recognized extension becomes an [`Action`](types::Action); its metadata
//! comes from `# kadai:<key> <value>` comment lines near the top of the file.

pub mod command;
pub mod frontmatter;
pub mod history;
pub mod loader;
pub mod types;
pub mod which;

pub use {
    command::resolve_command,
    loader::{LoadOptions, load_actions, load_actions_with},
    types::{Action, ActionMeta, Origin, Runtime},
    which::WhichCache,
};
