//! Error plumbing shared by the kadai library crates.

pub mod error;

pub use error::FromMessage;
